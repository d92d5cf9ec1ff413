use async_trait::async_trait;
use thiserror::Error;

use crate::models::RepoRecord;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("repository already stored")]
  AlreadyExists,
  #[error("repository already claimed by another cycle")]
  AlreadyWorkedOn,
  #[error("repository not stored")]
  NotFound,
  #[error(transparent)]
  Db(#[from] sqlx::Error),
}

/// Durable record store for repositories. Any key/record store works as long
/// as `create` surfaces duplicates and `claim` is a single conditional write.
#[async_trait]
pub trait Store: Send + Sync {
  async fn get_by_name(&self, name: &str) -> Result<Option<RepoRecord>, StoreError>;

  /// Inserts a new record; `AlreadyExists` if the repository is stored.
  async fn create(&self, record: &RepoRecord) -> Result<(), StoreError>;

  /// Overwrites the stored record.
  async fn put(&self, record: &RepoRecord) -> Result<(), StoreError>;

  /// Atomically sets the worked-on flag. `AlreadyWorkedOn` if another cycle
  /// holds the claim, `NotFound` if the repository is not stored.
  async fn claim(&self, name: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
pub mod memory {
  use super::*;
  use std::collections::HashMap;
  use std::sync::Mutex;

  /// Hash-map store for consumer tests.
  #[derive(Default)]
  pub struct MemoryStore {
    records: Mutex<HashMap<String, RepoRecord>>,
  }

  impl MemoryStore {
    pub fn with(records: impl IntoIterator<Item = RepoRecord>) -> Self {
      let store = Self::default();
      {
        let mut map = store.records.lock().unwrap();
        for record in records {
          map.insert(record.name.clone(), record);
        }
      }
      store
    }

    pub fn snapshot(&self, name: &str) -> Option<RepoRecord> {
      self.records.lock().unwrap().get(name).cloned()
    }
  }

  #[async_trait]
  impl Store for MemoryStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<RepoRecord>, StoreError> {
      Ok(self.records.lock().unwrap().get(name).cloned())
    }

    async fn create(&self, record: &RepoRecord) -> Result<(), StoreError> {
      let mut map = self.records.lock().unwrap();
      if map.contains_key(&record.name) {
        return Err(StoreError::AlreadyExists);
      }
      map.insert(record.name.clone(), record.clone());
      Ok(())
    }

    async fn put(&self, record: &RepoRecord) -> Result<(), StoreError> {
      self.records.lock().unwrap().insert(record.name.clone(), record.clone());
      Ok(())
    }

    async fn claim(&self, name: &str) -> Result<(), StoreError> {
      let mut map = self.records.lock().unwrap();
      let record = map.get_mut(name).ok_or(StoreError::NotFound)?;
      if record.worked_on {
        return Err(StoreError::AlreadyWorkedOn);
      }
      record.worked_on = true;
      Ok(())
    }
  }
}
