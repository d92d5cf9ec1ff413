use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::consumer::Outcome;
use crate::crawl::{PER_PAGE, get_all_timestamps};
use crate::dispatch::JobQueue;
use crate::github::stargazers_url;
use crate::models::{CrawlJob, RepoRecord};
use crate::store::{Store, StoreError};

/// Handles one message from the add queue: claims the repository by creating
/// its record, crawls the full star history through the worker pool and
/// persists the finished record.
///
/// Duplicate requests (already stored, worked on or not) are acknowledged as
/// no-ops; the crawl either completes fully or is requeued.
pub async fn process<S: Store>(store: &S, jobs: &JobQueue, api_base: &str, body: &[u8]) -> Outcome {
  let job: CrawlJob = match serde_json::from_slice(body) {
    Ok(job) => job,
    Err(e) => {
      warn!("dropping malformed create message: {e}");
      return Outcome::Ack;
    }
  };
  match create_repo(store, jobs, api_base, &job).await {
    Ok(true) => {
      info!(repo = %job.name, "star history created");
      Outcome::Ack
    }
    Ok(false) => {
      warn!(repo = %job.name, "asked to recreate, skipping");
      Outcome::Ack
    }
    Err(e) => {
      error!(repo = %job.name, "create failed, requeueing: {e:?}");
      Outcome::Requeue
    }
  }
}

/// Returns false when the repository was already stored.
async fn create_repo<S: Store>(
  store: &S,
  jobs: &JobQueue,
  api_base: &str,
  job: &CrawlJob,
) -> Result<bool> {
  if store.get_by_name(&job.name).await?.is_some() {
    return Ok(false);
  }

  let mut record = RepoRecord::new(job.id, job.name.clone(), job.star_count, job.created_at.clone());
  record.worked_on = true;
  match store.create(&record).await {
    Ok(()) => {}
    Err(StoreError::AlreadyExists) => return Ok(false),
    Err(e) => return Err(e.into()),
  }

  let url = stargazers_url(api_base, job.id);
  let timestamps =
    get_all_timestamps(jobs, PER_PAGE, &job.token, job.star_count as usize, &url).await?;

  record.last_star_date = timestamps.last().and_then(|&s| epoch_to_rfc3339(s));
  record.last_update = Some(Utc::now().to_rfc3339());
  record.timestamps = timestamps;
  record.worked_on = false;
  store.put(&record).await?;
  Ok(true)
}

pub(crate) fn epoch_to_rfc3339(secs: i64) -> Option<String> {
  DateTime::<Utc>::from_timestamp(secs, 0).map(|t| t.to_rfc3339())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dispatch::Dispatcher;
  use crate::github::{FetchError, StarPageFetcher};
  use crate::store::memory::MemoryStore;
  use async_trait::async_trait;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct StubPages {
    total: usize,
    fail: bool,
    calls: AtomicUsize,
  }

  impl StubPages {
    fn new(total: usize) -> Arc<Self> {
      Arc::new(Self { total, fail: false, calls: AtomicUsize::new(0) })
    }

    fn failing() -> Arc<Self> {
      Arc::new(Self { total: 1, fail: true, calls: AtomicUsize::new(0) })
    }
  }

  #[async_trait]
  impl StarPageFetcher for StubPages {
    async fn fetch_page(&self, url: &str, page: usize, _token: &str) -> Result<Vec<i64>, FetchError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.fail {
        return Err(FetchError::Status {
          status: reqwest::StatusCode::BAD_GATEWAY,
          url: url.to_string(),
        });
      }
      let start = (page - 1) * PER_PAGE;
      let end = (start + PER_PAGE).min(self.total);
      Ok((start..end).rev().map(|n| n as i64).collect())
    }
  }

  fn job(name: &str, stars: i64) -> Vec<u8> {
    serde_json::to_vec(&CrawlJob {
      id: 7,
      name: name.into(),
      star_count: stars,
      created_at: "2016-01-01T00:00:00Z".into(),
      token: "token".into(),
    })
    .unwrap()
  }

  #[tokio::test]
  async fn crawls_and_persists_new_repo() {
    let store = MemoryStore::default();
    let fetcher = StubPages::new(250);
    let dispatcher = Dispatcher::start(4, 4, fetcher.clone());

    let outcome = process(&store, &dispatcher.job_queue(), "http://stub", &job("a/b", 250)).await;
    assert_eq!(outcome, Outcome::Ack);

    let record = store.snapshot("a/b").unwrap();
    assert!(!record.worked_on);
    assert_eq!(record.timestamps.len(), 250);
    assert!(record.timestamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(record.last_star_date.as_deref(), epoch_to_rfc3339(249).as_deref());
    assert!(record.last_update.is_some());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn existing_repo_is_acked_without_crawling() {
    let store = MemoryStore::with([RepoRecord::new(7, "a/b".into(), 3, String::new())]);
    let fetcher = StubPages::new(300);
    let dispatcher = Dispatcher::start(1, 1, fetcher.clone());

    let outcome = process(&store, &dispatcher.job_queue(), "http://stub", &job("a/b", 300)).await;
    assert_eq!(outcome, Outcome::Ack);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn repo_claimed_by_another_cycle_is_acked() {
    let mut claimed = RepoRecord::new(7, "a/b".into(), 3, String::new());
    claimed.worked_on = true;
    let store = MemoryStore::with([claimed]);
    let fetcher = StubPages::new(300);
    let dispatcher = Dispatcher::start(1, 1, fetcher.clone());

    let outcome = process(&store, &dispatcher.job_queue(), "http://stub", &job("a/b", 300)).await;
    assert_eq!(outcome, Outcome::Ack);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn failed_crawl_is_requeued() {
    let store = MemoryStore::default();
    let dispatcher = Dispatcher::start(1, 1, StubPages::failing());

    let outcome = process(&store, &dispatcher.job_queue(), "http://stub", &job("a/b", 1)).await;
    assert_eq!(outcome, Outcome::Requeue);
    // claim stays on the record until the requeued job resolves it
    assert!(store.snapshot("a/b").unwrap().worked_on);

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn malformed_message_is_dropped_not_requeued() {
    let store = MemoryStore::default();
    let dispatcher = Dispatcher::start(1, 1, StubPages::new(0));

    let outcome = process(&store, &dispatcher.job_queue(), "http://stub", b"not json").await;
    assert_eq!(outcome, Outcome::Ack);
    assert!(store.snapshot("a/b").is_none());

    dispatcher.stop().await;
  }

  #[tokio::test]
  async fn zero_star_repo_is_created_empty() {
    let store = MemoryStore::default();
    let fetcher = StubPages::new(0);
    let dispatcher = Dispatcher::start(1, 1, fetcher.clone());

    let outcome = process(&store, &dispatcher.job_queue(), "http://stub", &job("a/b", 0)).await;
    assert_eq!(outcome, Outcome::Ack);

    let record = store.snapshot("a/b").unwrap();
    assert!(record.timestamps.is_empty());
    assert!(record.last_star_date.is_none());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

    dispatcher.stop().await;
  }
}
