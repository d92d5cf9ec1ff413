use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::models::RepoRecord;
use crate::store::{Store, StoreError};

static MIGRATOR: Migrator = sqlx::migrate!();

pub async fn setup_database(database_url: &str) -> Pool<Postgres> {
  let pool = Pool::<Postgres>::connect(database_url)
    .await
    .expect("Failed to connect to database.");

  MIGRATOR.run(&pool)
    .await
    .expect("Failed to run database migrations.");
  info!("Database migrations complete");
  pool
}

#[derive(Clone)]
pub struct PgStore {
  pool: Pool<Postgres>,
}

impl PgStore {
  pub fn new(pool: Pool<Postgres>) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl Store for PgStore {
  async fn get_by_name(&self, name: &str) -> Result<Option<RepoRecord>, StoreError> {
    let record = sqlx::query_as::<_, RepoRecord>(
      "SELECT id, name, star_count, created_at, last_star_date, last_update, worked_on, timestamps
       FROM repos WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(&self.pool)
    .await?;
    Ok(record)
  }

  async fn create(&self, record: &RepoRecord) -> Result<(), StoreError> {
    let result = sqlx::query(
      "INSERT INTO repos (id, name, star_count, created_at, last_star_date, last_update, worked_on, timestamps)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
       ON CONFLICT (name) DO NOTHING",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(record.star_count)
    .bind(&record.created_at)
    .bind(&record.last_star_date)
    .bind(&record.last_update)
    .bind(record.worked_on)
    .bind(&record.timestamps)
    .execute(&self.pool)
    .await?;
    if result.rows_affected() == 0 {
      return Err(StoreError::AlreadyExists);
    }
    Ok(())
  }

  async fn put(&self, record: &RepoRecord) -> Result<(), StoreError> {
    sqlx::query(
      "UPDATE repos
       SET star_count = $2, created_at = $3, last_star_date = $4, last_update = $5,
           worked_on = $6, timestamps = $7
       WHERE name = $1",
    )
    .bind(&record.name)
    .bind(record.star_count)
    .bind(&record.created_at)
    .bind(&record.last_star_date)
    .bind(&record.last_update)
    .bind(record.worked_on)
    .bind(&record.timestamps)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn claim(&self, name: &str) -> Result<(), StoreError> {
    // Single conditional write so two cycles can never both win the claim.
    let result = sqlx::query("UPDATE repos SET worked_on = TRUE WHERE name = $1 AND worked_on = FALSE")
      .bind(name)
      .execute(&self.pool)
      .await?;
    if result.rows_affected() == 0 {
      let exists = sqlx::query("SELECT 1 FROM repos WHERE name = $1")
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
      return Err(match exists {
        Some(_) => StoreError::AlreadyWorkedOn,
        None => StoreError::NotFound,
      });
    }
    Ok(())
  }
}
