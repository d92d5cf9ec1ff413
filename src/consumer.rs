use anyhow::Result;
use futures::StreamExt;
use lapin::Channel;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use std::future::Future;
use tracing::{error, info};

/// Terminal decision for one delivery. `Ack` also covers poison messages
/// that are dropped on purpose; only `Requeue` puts the job back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Ack,
  Requeue,
}

/// Consumes `queue` sequentially: the handler for one delivery finishes
/// before the next one is read, and every delivery gets exactly one
/// terminal action.
pub async fn run_consumer<F, Fut>(channel: Channel, queue: &str, tag: &str, handler: F) -> Result<()>
where
  F: Fn(Vec<u8>) -> Fut,
  Fut: Future<Output = Outcome>,
{
  let mut consumer = channel
    .basic_consume(queue, tag, BasicConsumeOptions::default(), FieldTable::default())
    .await?;
  info!(queue, "consuming");

  while let Some(delivery) = consumer.next().await {
    match delivery {
      Ok(delivery) => {
        let outcome = handler(delivery.data.clone()).await;
        let terminal = match outcome {
          Outcome::Ack => delivery.ack(BasicAckOptions::default()).await,
          Outcome::Requeue => {
            delivery
              .nack(BasicNackOptions { requeue: true, ..Default::default() })
              .await
          }
        };
        if let Err(e) = terminal {
          error!(queue, "failed to settle delivery: {e:?}");
        }
      }
      Err(e) => error!(queue, "consumer error: {e:?}"),
    }
  }
  Ok(())
}
