use std::sync::Arc;
use stargraph::{
  config::Config,
  database::{PgStore, setup_database},
  github::GithubClient,
  messaging::{ADD_QUEUE, UPDATE_QUEUE, create_rabbit_channel, declare_queue},
  routes::routes,
  trace::TraceBuffer,
};

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

  let github = GithubClient::new(&config.github_api_url).expect("Failed to build GitHub client");
  let trace = Arc::new(TraceBuffer::new(64));

  let api = routes(PgStore::new(db_pool), rabbit_channel, github, trace);

  warp::serve(api)
    .run(([0, 0, 0, 0], config.server_port))
    .await;
}
