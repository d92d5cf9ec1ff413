/// Merges one freshly fetched stargazers page into the stored series and
/// reports whether the page overlapped data that is already known.
///
/// The page covers positions `(page-1)*per_page ..` of the series. A short
/// page is the current tail of the listing, so anything stored beyond it is
/// stale and gets truncated; a full page grows the series as needed before
/// being written. Positions are compared from the end of the page backward:
/// the first match means every older position was already correct from a
/// previous run, so the scan stops there and the caller can stop paging.
pub fn merge_page(per_page: usize, page: usize, new_stamps: &[i64], series: &mut Vec<i64>) -> bool {
  let base = (page - 1) * per_page;
  let tail_len = new_stamps.len().min(per_page);

  if new_stamps.len() < per_page {
    // Short page: the listing ends here, drop anything stored past it.
    series.resize(base + tail_len, 0);
  } else if series.len() < base + per_page {
    series.resize(base + per_page, 0);
  }

  for i in (0..tail_len).rev() {
    if series[base + i] == new_stamps[i] {
      return true;
    }
    series[base + i] = new_stamps[i];
  }
  false
}
