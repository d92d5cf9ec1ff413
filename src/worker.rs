use lapin::options::BasicQosOptions;
use std::sync::Arc;
use tracing::{error, info};

use stargraph::config::Config;
use stargraph::consumer::run_consumer;
use stargraph::creator;
use stargraph::database::{PgStore, setup_database};
use stargraph::dispatch::Dispatcher;
use stargraph::github::GithubClient;
use stargraph::messaging::{ADD_QUEUE, UPDATE_QUEUE, create_rabbit_channel, declare_queue};
use stargraph::updater;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt::init();
  let config = Config::from_env();

  let db_pool = setup_database(&config.database_url).await;
  let rabbit_channel = create_rabbit_channel(&config.rabbitmq_url)
    .await
    .expect("Failed to create RabbitMQ channel");
  declare_queue(&rabbit_channel, ADD_QUEUE)
    .await
    .expect("Queue declaration failed");
  declare_queue(&rabbit_channel, UPDATE_QUEUE)
    .await
    .expect("Queue declaration failed");
  // One unsettled delivery per consumer: jobs are processed sequentially.
  rabbit_channel
    .basic_qos(1, BasicQosOptions::default())
    .await
    .expect("Failed to set QoS");

  let github = Arc::new(GithubClient::new(&config.github_api_url).expect("Failed to build GitHub client"));
  let store = Arc::new(PgStore::new(db_pool));
  let dispatcher = Dispatcher::start(config.worker_count, config.queue_size, github.clone());
  let jobs = dispatcher.job_queue();
  info!(workers = config.worker_count, "dispatcher started");

  let add_consumer = {
    let channel = rabbit_channel.clone();
    let store = store.clone();
    let jobs = jobs.clone();
    let api_base = config.github_api_url.clone();
    tokio::spawn(async move {
      let handler = |body: Vec<u8>| {
        let store = store.clone();
        let jobs = jobs.clone();
        let api_base = api_base.clone();
        async move { creator::process(store.as_ref(), &jobs, &api_base, &body).await }
      };
      if let Err(e) = run_consumer(channel, ADD_QUEUE, "creator", handler).await {
        error!("add consumer stopped: {e:?}");
      }
    })
  };

  let update_consumer = {
    let channel = rabbit_channel.clone();
    let store = store.clone();
    let github = github.clone();
    let api_base = config.github_api_url.clone();
    tokio::spawn(async move {
      let handler = |body: Vec<u8>| {
        let store = store.clone();
        let github = github.clone();
        let jobs = jobs.clone();
        let api_base = api_base.clone();
        async move {
          updater::process(store.as_ref(), github.as_ref(), &jobs, &api_base, &body).await
        }
      };
      if let Err(e) = run_consumer(channel, UPDATE_QUEUE, "updater", handler).await {
        error!("update consumer stopped: {e:?}");
      }
    })
  };

  tokio::signal::ctrl_c().await.expect("Failed to listen for shutdown signal");
  info!("shutting down");
  add_consumer.abort();
  update_consumer.abort();
  dispatcher.stop().await;
}
