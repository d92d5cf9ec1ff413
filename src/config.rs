use std::env;

use crate::github::DEFAULT_API_URL;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub rabbitmq_url: String,
  pub server_port: u16,
  pub github_api_url: String,
  pub worker_count: usize,
  pub queue_size: usize,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      database_url: env::var("DATABASE_URL").unwrap(),
      rabbitmq_url: env::var("RABBITMQ_URL").unwrap(),
      server_port: env::var("SERVER_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .unwrap_or(8080),
      github_api_url: env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
      worker_count: env::var("WORKER_COUNT")
        .unwrap_or_else(|_| "4".into())
        .parse()
        .unwrap_or(4),
      queue_size: env::var("QUEUE_SIZE")
        .unwrap_or_else(|_| "32".into())
        .parse()
        .unwrap_or(32),
    }
  }
}
