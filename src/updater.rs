use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::consumer::Outcome;
use crate::crawl::{PER_PAGE, fetch_page};
use crate::creator::epoch_to_rfc3339;
use crate::dispatch::JobQueue;
use crate::fusion::merge_page;
use crate::github::{RepoInfoSource, stargazers_url};
use crate::models::CrawlJob;
use crate::store::{Store, StoreError};

/// Handles one message from the update queue: claims the stored record,
/// refreshes the star count, then walks stargazers pages newest first
/// through the worker pool, merging each page into the stored series until
/// one overlaps already-known data.
pub async fn process<S, I>(store: &S, info: &I, jobs: &JobQueue, api_base: &str, body: &[u8]) -> Outcome
where
  S: Store,
  I: RepoInfoSource,
{
  let job: CrawlJob = match serde_json::from_slice(body) {
    Ok(job) => job,
    Err(e) => {
      warn!("dropping malformed update message: {e}");
      return Outcome::Ack;
    }
  };
  match update_repo(store, info, jobs, api_base, &job).await {
    Ok(Updated::Done) => {
      info!(repo = %job.name, "star history updated");
      Outcome::Ack
    }
    Ok(Updated::Skipped(reason)) => {
      warn!(repo = %job.name, reason, "update skipped");
      Outcome::Ack
    }
    Err(e) => {
      error!(repo = %job.name, "update failed, requeueing: {e:?}");
      Outcome::Requeue
    }
  }
}

enum Updated {
  Done,
  Skipped(&'static str),
}

async fn update_repo<S, I>(
  store: &S,
  info: &I,
  jobs: &JobQueue,
  api_base: &str,
  job: &CrawlJob,
) -> Result<Updated>
where
  S: Store,
  I: RepoInfoSource,
{
  let Some(mut record) = store.get_by_name(&job.name).await? else {
    return Ok(Updated::Skipped("not stored"));
  };
  match store.claim(&job.name).await {
    Ok(()) => {}
    Err(StoreError::AlreadyWorkedOn) => return Ok(Updated::Skipped("already claimed")),
    Err(StoreError::NotFound) => return Ok(Updated::Skipped("not stored")),
    Err(e) => return Err(e.into()),
  }
  record.worked_on = true;

  // Star counts move between crawls; the page walk needs the current one.
  let Some(fresh) = info.repo_info(&job.token, &job.name).await? else {
    record.worked_on = false;
    store.put(&record).await?;
    return Ok(Updated::Skipped("gone from GitHub"));
  };

  let url = stargazers_url(api_base, record.id);
  let last_page = (fresh.stargazers_count as usize).div_ceil(PER_PAGE).max(1);
  let mut series = std::mem::take(&mut record.timestamps);
  for page in (1..=last_page).rev() {
    let stamps = fetch_page(jobs, PER_PAGE, &job.token, &url, page).await?;
    if merge_page(PER_PAGE, page, &stamps, &mut series) {
      break;
    }
  }

  record.star_count = fresh.stargazers_count;
  record.last_star_date = series.last().and_then(|&s| epoch_to_rfc3339(s));
  record.last_update = Some(Utc::now().to_rfc3339());
  record.timestamps = series;
  record.worked_on = false;
  store.put(&record).await?;
  Ok(Updated::Done)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dispatch::Dispatcher;
  use crate::github::{FetchError, GithubRepoInfo, StarPageFetcher};
  use crate::models::RepoRecord;
  use crate::store::memory::MemoryStore;
  use async_trait::async_trait;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Pages over a fixed ascending series `0..total`.
  struct StubPages {
    total: usize,
    calls: AtomicUsize,
  }

  impl StubPages {
    fn new(total: usize) -> Arc<Self> {
      Arc::new(Self { total, calls: AtomicUsize::new(0) })
    }
  }

  #[async_trait]
  impl StarPageFetcher for StubPages {
    async fn fetch_page(&self, _url: &str, page: usize, _token: &str) -> Result<Vec<i64>, FetchError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let start = (page - 1) * PER_PAGE;
      let end = (start + PER_PAGE).min(self.total);
      Ok((start..end).map(|n| n as i64).collect())
    }
  }

  struct StubInfo {
    count: Option<i64>,
  }

  #[async_trait]
  impl RepoInfoSource for StubInfo {
    async fn repo_info(&self, _token: &str, repo: &str) -> Result<Option<GithubRepoInfo>, FetchError> {
      Ok(self.count.map(|stargazers_count| GithubRepoInfo {
        id: 7,
        full_name: repo.to_string(),
        stargazers_count,
        created_at: "2016-01-01T00:00:00Z".into(),
      }))
    }
  }

  fn job(name: &str) -> Vec<u8> {
    serde_json::to_vec(&CrawlJob {
      id: 7,
      name: name.into(),
      star_count: 0,
      created_at: "2016-01-01T00:00:00Z".into(),
      token: "token".into(),
    })
    .unwrap()
  }

  fn stored(name: &str, stamps: Vec<i64>) -> RepoRecord {
    let mut record = RepoRecord::new(7, name.into(), stamps.len() as i64, String::new());
    record.timestamps = stamps;
    record
  }

  #[tokio::test]
  async fn merges_new_tail_and_stops_on_overlap() {
    // stored series already holds the first 150 stars; 30 more arrived
    let store = MemoryStore::with([stored("a/b", (0..150).collect())]);
    let fetcher = StubPages::new(180);
    let dispatcher = Dispatcher::start(2, 2, fetcher.clone());

    let outcome = process(
      &store,
      &StubInfo { count: Some(180) },
      &dispatcher.job_queue(),
      "http://stub",
      &job("a/b"),
    )
    .await;
    assert_eq!(outcome, Outcome::Ack);

    let record = store.snapshot("a/b").unwrap();
    assert!(!record.worked_on);
    assert_eq!(record.star_count, 180);
    assert_eq!(record.timestamps, (0..180).collect::<Vec<i64>>());
    // page 2 overlapped stored data, so page 1 was never fetched
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn walks_all_the_way_down_when_nothing_matches() {
    let store = MemoryStore::with([stored("a/b", vec![-1, -2, -3])]);
    let fetcher = StubPages::new(180);
    let dispatcher = Dispatcher::start(2, 2, fetcher.clone());

    let outcome = process(
      &store,
      &StubInfo { count: Some(180) },
      &dispatcher.job_queue(),
      "http://stub",
      &job("a/b"),
    )
    .await;
    assert_eq!(outcome, Outcome::Ack);

    let record = store.snapshot("a/b").unwrap();
    assert_eq!(record.timestamps, (0..180).collect::<Vec<i64>>());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn claimed_record_is_skipped() {
    let mut claimed = stored("a/b", vec![1, 2, 3]);
    claimed.worked_on = true;
    let store = MemoryStore::with([claimed]);
    let fetcher = StubPages::new(10);
    let dispatcher = Dispatcher::start(1, 1, fetcher.clone());

    let outcome = process(
      &store,
      &StubInfo { count: Some(10) },
      &dispatcher.job_queue(),
      "http://stub",
      &job("a/b"),
    )
    .await;
    assert_eq!(outcome, Outcome::Ack);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.snapshot("a/b").unwrap().timestamps, vec![1, 2, 3]);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn unknown_repo_is_acked_as_noop() {
    let store = MemoryStore::default();
    let dispatcher = Dispatcher::start(1, 1, StubPages::new(10));

    let outcome = process(
      &store,
      &StubInfo { count: Some(10) },
      &dispatcher.job_queue(),
      "http://stub",
      &job("a/b"),
    )
    .await;
    assert_eq!(outcome, Outcome::Ack);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn repo_gone_from_github_releases_the_claim() {
    let store = MemoryStore::with([stored("a/b", vec![1, 2, 3])]);
    let dispatcher = Dispatcher::start(1, 1, StubPages::new(10));

    let outcome = process(
      &store,
      &StubInfo { count: None },
      &dispatcher.job_queue(),
      "http://stub",
      &job("a/b"),
    )
    .await;
    assert_eq!(outcome, Outcome::Ack);
    assert!(!store.snapshot("a/b").unwrap().worked_on);

    dispatcher.stop().await;
  }
}
