//! SQLite Record Store
//!
//! Each record is a row in `compliance_records`; `seq` gives storage order
//! and the full record is kept as JSON in `body`.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::ledger::record::{ComplianceRecord, RecordKind};
use crate::ledger::store::RecordStore;

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Fixed-width UTC timestamps sort the same as text and as time.
pub(crate) fn timestamp_key(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_rows(rows: Vec<SqliteRow>) -> Result<Vec<ComplianceRecord>> {
    rows.iter()
        .map(|row| -> Result<ComplianceRecord> {
            let body: String = row.try_get("body")?;
            Ok(serde_json::from_str(&body)?)
        })
        .collect()
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn append(&self, record: &ComplianceRecord) -> Result<u64> {
        let body = serde_json::to_string(record)?;

        let result = sqlx::query(
            r#"
            INSERT INTO compliance_records
            (kind, record_id, user_id, order_id, timestamp, hash, previous_hash, body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.kind().as_str())
        .bind(record.id())
        .bind(record.user_id())
        .bind(record.order_id())
        .bind(timestamp_key(record.timestamp()))
        .bind(record.hash())
        .bind(record.previous_hash())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::IntegrityViolation(
                format!("{} {} is already stored", record.kind(), record.id()),
            ),
            other => LedgerError::from(other),
        })?;

        let seq = result.last_insert_rowid() as u64;
        debug!("Stored {} at seq {}", record.summary(), seq);
        Ok(seq)
    }

    async fn records_for_user(&self, user_id: &str) -> Result<Vec<ComplianceRecord>> {
        let rows = sqlx::query("SELECT body FROM compliance_records WHERE user_id = ? ORDER BY seq")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        decode_rows(rows)
    }

    async fn records_for_order(&self, order_id: &str) -> Result<Vec<ComplianceRecord>> {
        if order_id.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT body FROM compliance_records WHERE order_id = ? ORDER BY seq")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        decode_rows(rows)
    }

    async fn find(&self, kind: RecordKind, id: &str) -> Result<Option<ComplianceRecord>> {
        let row = sqlx::query(
            "SELECT body FROM compliance_records WHERE kind = ? AND record_id = ? ORDER BY seq LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ComplianceRecord>> {
        let rows = sqlx::query(
            "SELECT body FROM compliance_records WHERE timestamp >= ? AND timestamp <= ? ORDER BY seq",
        )
        .bind(timestamp_key(start))
        .bind(timestamp_key(end))
        .fetch_all(&self.pool)
        .await?;
        decode_rows(rows)
    }

    async fn users(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT user_id FROM compliance_records ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("user_id").map_err(LedgerError::from))
            .collect()
    }

    async fn len(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM compliance_records")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("Closed SQLite record store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::ledger::record::ValidationRecord;
    use chrono::TimeZone;

    fn sealed(id: &str, user: &str, order: &str, minute: u32) -> ComplianceRecord {
        let mut record: ComplianceRecord = ValidationRecord {
            id: id.to_string(),
            user_id: user.to_string(),
            order_id: order.to_string(),
            materials_cost: 100.0,
            labor_cost: 50.0,
            currency: "USD".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 9, minute, 0).unwrap(),
            ..Default::default()
        }
        .into();
        let hash = record.calculate_hash().unwrap();
        record.set_hash(hash);
        record
    }

    #[tokio::test]
    async fn test_sqlite_append_and_query() {
        let db = Database::new_in_memory().await.unwrap();
        let store = db.record_store();

        store.append(&sealed("v1", "u1", "o1", 0)).await.unwrap();
        store.append(&sealed("v2", "u2", "o1", 1)).await.unwrap();
        store.append(&sealed("v3", "u1", "", 2)).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 3);
        assert_eq!(store.users().await.unwrap(), vec!["u1", "u2"]);
        assert_eq!(store.records_for_order("o1").await.unwrap().len(), 2);
        assert!(store.records_for_order("").await.unwrap().is_empty());

        let ids: Vec<String> = store
            .records_for_user("u1")
            .await
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["v1", "v3"]);

        let found = store.find(RecordKind::Validation, "v2").await.unwrap().unwrap();
        assert!(found.verify_hash());
    }

    #[tokio::test]
    async fn test_sqlite_range_query() {
        let db = Database::new_in_memory().await.unwrap();
        let store = db.record_store();
        for minute in 0..4 {
            store
                .append(&sealed(&format!("v{}", minute), "u1", "o1", minute))
                .await
                .unwrap();
        }
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 1, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 9, 2, 0).unwrap();
        assert_eq!(store.records_in_range(start, end).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_rejects_duplicate_hash() {
        let db = Database::new_in_memory().await.unwrap();
        let store = db.record_store();
        let record = sealed("v1", "u1", "o1", 0);
        store.append(&record).await.unwrap();
        let err = store.append(&record).await.unwrap_err();
        assert!(matches!(err, LedgerError::IntegrityViolation(_)));
    }

    #[tokio::test]
    async fn test_sqlite_records_are_write_once() {
        let db = Database::new_in_memory().await.unwrap();
        let store = db.record_store();
        store.append(&sealed("v1", "u1", "o1", 0)).await.unwrap();

        let update = sqlx::query("UPDATE compliance_records SET user_id = 'u2'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM compliance_records").execute(db.pool()).await;
        assert!(delete.is_err());

        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_sqlite_store_rejects_appends() {
        let db = Database::new_in_memory().await.unwrap();
        let store = db.record_store();
        store.close().await.unwrap();
        let err = store.append(&sealed("v1", "u1", "o1", 0)).await.unwrap_err();
        assert!(err.is_transient());
    }
}
