pub mod heads;
pub mod records;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

use crate::error::Result;

pub use heads::SqliteChainHeadStore;
pub use records::SqliteRecordStore;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to `database_url`, creating the file if needed, and migrate.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let db = Database { pool };
        db.run_migrations().await?;
        info!("Connected to {}", database_url);
        Ok(db)
    }

    /// Private in-memory database on a single connection.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        for statement in schema::MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn record_store(&self) -> SqliteRecordStore {
        SqliteRecordStore::new(self.pool.clone())
    }

    pub fn head_store(&self) -> SqliteChainHeadStore {
        SqliteChainHeadStore::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
