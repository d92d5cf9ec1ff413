use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::github::{FetchError, StarPageFetcher};

pub type PageResult = Result<Vec<i64>, FetchError>;

/// Cloneable handle for submitting tasks. Sending blocks while the bounded
/// queue is full, which is the intended backpressure on crawl submission.
pub type JobQueue = mpsc::Sender<Task>;

/// One page fetch. The worker that picks it up performs exactly one request
/// and writes exactly one result to `results`.
#[derive(Debug)]
pub struct Task {
  pub page: usize,
  pub url: String,
  pub token: String,
  pub results: mpsc::Sender<PageResult>,
}

/// Pool of page-fetch workers. Workers register their private inbox into a
/// shared pool channel; a forwarding loop pairs each queued task with
/// whichever inbox becomes available next, so submission never waits on a
/// specific worker.
pub struct Dispatcher {
  jobs: mpsc::Sender<Task>,
  stop: watch::Sender<bool>,
  handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
  /// Starts `worker_count` workers and the forwarding loop. `queue_size`
  /// bounds the inbound task queue.
  pub fn start(worker_count: usize, queue_size: usize, fetcher: Arc<dyn StarPageFetcher>) -> Self {
    let (jobs, mut job_rx) = mpsc::channel::<Task>(queue_size);
    let (pool_tx, mut pool_rx) = mpsc::channel::<mpsc::Sender<Task>>(worker_count.max(1));
    let (stop, _) = watch::channel(false);

    let mut handles = Vec::with_capacity(worker_count + 1);
    for number in 0..worker_count {
      let pool_tx = pool_tx.clone();
      let fetcher = fetcher.clone();
      let stop_rx = stop.subscribe();
      handles.push(tokio::spawn(worker_loop(number, pool_tx, fetcher, stop_rx)));
    }

    let mut stop_rx = stop.subscribe();
    handles.push(tokio::spawn(async move {
      loop {
        let task = tokio::select! {
          task = job_rx.recv() => match task {
            Some(task) => task,
            None => break,
          },
          _ = stop_rx.changed() => break,
        };
        // A worker that shut down between registering and being picked
        // hands the task back; try the next free inbox.
        let mut task = task;
        loop {
          let Some(inbox) = pool_rx.recv().await else { return };
          match inbox.send(task).await {
            Ok(()) => break,
            Err(mpsc::error::SendError(returned)) => task = returned,
          }
        }
      }
    }));

    Self { jobs, stop, handles }
  }

  /// Cloneable submission handle shared with coordinators.
  pub fn job_queue(&self) -> JobQueue {
    self.jobs.clone()
  }

  /// Enqueues one task, waiting while the bounded queue is full.
  pub async fn submit(&self, task: Task) -> Result<(), mpsc::error::SendError<Task>> {
    self.jobs.send(task).await
  }

  /// Signals every worker to exit after its current task and waits for the
  /// loops to finish. Queued tasks that were never handed out are dropped.
  pub async fn stop(self) {
    let _ = self.stop.send(true);
    drop(self.jobs);
    for handle in self.handles {
      let _ = handle.await;
    }
  }
}

async fn worker_loop(
  number: usize,
  pool_tx: mpsc::Sender<mpsc::Sender<Task>>,
  fetcher: Arc<dyn StarPageFetcher>,
  mut stop_rx: watch::Receiver<bool>,
) {
  loop {
    let (inbox_tx, mut inbox_rx) = mpsc::channel::<Task>(1);
    tokio::select! {
      registered = pool_tx.send(inbox_tx) => {
        if registered.is_err() {
          break;
        }
      }
      _ = stop_rx.changed() => break,
    }
    let task = tokio::select! {
      task = inbox_rx.recv() => match task {
        Some(task) => task,
        None => break,
      },
      _ = stop_rx.changed() => break,
    };
    debug!(worker = number, page = task.page, "fetching page");
    let result = fetcher.fetch_page(&task.url, task.page, &task.token).await;
    let _ = task.results.send(result).await;
  }
}
