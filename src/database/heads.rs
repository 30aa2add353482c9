//! SQLite Chain Heads
//!
//! Compare-and-swap is a conditional write; it succeeds iff exactly one row
//! was affected.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::ledger::heads::{ChainHeadStore, GENESIS_HEAD};

#[derive(Clone)]
pub struct SqliteChainHeadStore {
    pool: SqlitePool,
}

impl SqliteChainHeadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn conflict(user_id: &str) -> LedgerError {
        debug!("Chain head moved for user {}", user_id);
        LedgerError::ChainForkDetected {
            user_id: user_id.to_string(),
            attempts: 1,
        }
    }
}

#[async_trait]
impl ChainHeadStore for SqliteChainHeadStore {
    async fn get_head(&self, user_id: &str) -> Result<String> {
        let row = sqlx::query("SELECT head_hash FROM chain_heads WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("head_hash")?),
            None => Ok(GENESIS_HEAD.to_string()),
        }
    }

    async fn set_head(&self, user_id: &str, new_hash: &str, expected_previous_head: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        let affected = match (expected_previous_head.is_empty(), new_hash.is_empty()) {
            (true, true) => {
                return if self.get_head(user_id).await?.is_empty() {
                    Ok(())
                } else {
                    Err(Self::conflict(user_id))
                };
            }
            (true, false) => sqlx::query(
                r#"
                INSERT INTO chain_heads (user_id, head_hash, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(new_hash)
            .bind(&now)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            (false, true) => sqlx::query("DELETE FROM chain_heads WHERE user_id = ? AND head_hash = ?")
                .bind(user_id)
                .bind(expected_previous_head)
                .execute(&self.pool)
                .await?
                .rows_affected(),
            (false, false) => sqlx::query(
                "UPDATE chain_heads SET head_hash = ?, updated_at = ? WHERE user_id = ? AND head_hash = ?",
            )
            .bind(new_hash)
            .bind(&now)
            .bind(user_id)
            .bind(expected_previous_head)
            .execute(&self.pool)
            .await?
            .rows_affected(),
        };

        if affected == 1 {
            Ok(())
        } else {
            Err(Self::conflict(user_id))
        }
    }

    async fn users(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT user_id FROM chain_heads ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("user_id").map_err(LedgerError::from))
            .collect()
    }
}
