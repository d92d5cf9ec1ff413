use thiserror::Error;
use tokio::sync::mpsc;

use crate::dispatch::{JobQueue, Task};
use crate::github::FetchError;

/// Stars per stargazers page. GitHub caps per_page at 100.
pub const PER_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum CrawlError {
  #[error(transparent)]
  Fetch(#[from] FetchError),
  #[error("dispatcher is no longer accepting tasks")]
  QueueClosed,
}

/// Fetches the complete star history for a repository through the worker
/// pool and returns it sorted ascending.
///
/// One task per page is submitted, results are collected in whatever order
/// the workers finish, and the first page error aborts the crawl. A partial
/// series is never returned; the remaining results are still drained so no
/// worker is left blocked on a dead channel.
pub async fn get_all_timestamps(
  jobs: &JobQueue,
  per_page: usize,
  token: &str,
  star_count: usize,
  api_url: &str,
) -> Result<Vec<i64>, CrawlError> {
  let pages = star_count.div_ceil(per_page);
  if pages == 0 {
    return Ok(Vec::new());
  }

  let url = format!("{api_url}?per_page={per_page}");
  let (results_tx, mut results_rx) = mpsc::channel(8);

  // Submission runs on its own task so backpressure on the bounded job
  // queue never blocks result collection.
  let submitter = {
    let jobs = jobs.clone();
    let token = token.to_string();
    tokio::spawn(async move {
      for page in 1..=pages {
        let task = Task {
          page,
          url: url.clone(),
          token: token.clone(),
          results: results_tx.clone(),
        };
        if jobs.send(task).await.is_err() {
          return Err(CrawlError::QueueClosed);
        }
      }
      Ok(())
    })
  };

  let mut timestamps = Vec::with_capacity(star_count);
  let mut first_error = None;
  for _ in 0..pages {
    match results_rx.recv().await {
      Some(Ok(stamps)) => timestamps.extend(stamps),
      Some(Err(e)) => {
        if first_error.is_none() {
          first_error = Some(CrawlError::Fetch(e));
        }
      }
      // All result senders are gone: the dispatcher dropped pending tasks.
      None => {
        if first_error.is_none() {
          first_error = Some(CrawlError::QueueClosed);
        }
        break;
      }
    }
  }
  match submitter.await {
    Ok(Ok(())) => {}
    Ok(Err(e)) => {
      if first_error.is_none() {
        first_error = Some(e);
      }
    }
    Err(_) => {
      if first_error.is_none() {
        first_error = Some(CrawlError::QueueClosed);
      }
    }
  }
  if let Some(e) = first_error {
    return Err(e);
  }

  // Page completion order is arbitrary, so global order is established here.
  timestamps.sort_unstable();
  Ok(timestamps)
}

/// Fetches a single page through the worker pool. Used by the update path,
/// which walks pages newest first instead of crawling everything.
pub async fn fetch_page(
  jobs: &JobQueue,
  per_page: usize,
  token: &str,
  api_url: &str,
  page: usize,
) -> Result<Vec<i64>, CrawlError> {
  let (results_tx, mut results_rx) = mpsc::channel(1);
  let task = Task {
    page,
    url: format!("{api_url}?per_page={per_page}"),
    token: token.to_string(),
    results: results_tx,
  };
  jobs.send(task).await.map_err(|_| CrawlError::QueueClosed)?;
  match results_rx.recv().await {
    Some(Ok(stamps)) => Ok(stamps),
    Some(Err(e)) => Err(e.into()),
    None => Err(CrawlError::QueueClosed),
  }
}
