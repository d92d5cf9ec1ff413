pub mod config;
pub mod consumer;
pub mod crawl;
pub mod creator;
pub mod database;
pub mod dispatch;
pub mod fusion;
pub mod github;
pub mod messaging;
pub mod models;
pub mod routes;
pub mod store;
pub mod trace;
pub mod updater;
