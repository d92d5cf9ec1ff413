use serde::{Serialize, Deserialize};

/// One repository as persisted by the store. `timestamps` is the full star
/// history in epoch seconds, ascending. `worked_on` guards against two
/// concurrent crawl cycles on the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RepoRecord {
  pub id: i64,
  pub name: String,
  pub star_count: i64,
  pub created_at: String,
  pub last_star_date: Option<String>,
  pub last_update: Option<String>,
  pub worked_on: bool,
  pub timestamps: Vec<i64>,
}

impl RepoRecord {
  pub fn new(id: i64, name: String, star_count: i64, created_at: String) -> Self {
    Self {
      id,
      name,
      star_count,
      created_at,
      last_star_date: None,
      last_update: None,
      worked_on: false,
      timestamps: Vec::new(),
    }
  }
}

/// Queue message body for both the add and update queues. Carries everything
/// the worker needs to resume work plus the caller's API token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlJob {
  pub id: i64,
  pub name: String,
  pub star_count: i64,
  pub created_at: String,
  pub token: String,
}

impl CrawlJob {
  pub fn new(record: &RepoRecord, token: String) -> Self {
    Self {
      id: record.id,
      name: record.name.clone(),
      star_count: record.star_count,
      created_at: record.created_at.clone(),
      token,
    }
  }
}
