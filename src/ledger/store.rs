//! Record Stores
//!
//! The durable append interface the ledger is written against, plus the
//! in-memory backend. Stores never mutate or delete a record once appended.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::ledger::record::{ComplianceRecord, RecordKind};

/// Append-only storage of linked compliance records.
///
/// Read operations return records in storage order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Durably append a linked record. Returns its storage sequence number.
    async fn append(&self, record: &ComplianceRecord) -> Result<u64>;

    async fn records_for_user(&self, user_id: &str) -> Result<Vec<ComplianceRecord>>;

    async fn records_for_order(&self, order_id: &str) -> Result<Vec<ComplianceRecord>>;

    async fn find(&self, kind: RecordKind, id: &str) -> Result<Option<ComplianceRecord>>;

    /// Records whose timestamp falls in `[start, end]`.
    async fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ComplianceRecord>>;

    /// Every user with at least one stored record.
    async fn users(&self) -> Result<Vec<String>>;

    async fn len(&self) -> Result<u64>;

    /// Flush and release the backing medium. Later appends fail.
    async fn close(&self) -> Result<()>;
}

/// Storage-ordered records with lookup indexes.
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    records: Vec<ComplianceRecord>,
    by_user: HashMap<String, Vec<usize>>,
    by_order: HashMap<String, Vec<usize>>,
    by_key: HashMap<(RecordKind, String), usize>,
    hashes: HashSet<String>,
}

impl RecordIndex {
    /// Reject records that would break write-once semantics.
    pub(crate) fn check_insertable(&self, record: &ComplianceRecord) -> Result<()> {
        if self.hashes.contains(record.hash()) {
            return Err(LedgerError::IntegrityViolation(format!(
                "{} {} is already stored",
                record.kind(),
                record.id()
            )));
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, record: ComplianceRecord) -> u64 {
        let position = self.records.len();
        self.by_user
            .entry(record.user_id().to_string())
            .or_default()
            .push(position);
        if !record.order_id().is_empty() {
            self.by_order
                .entry(record.order_id().to_string())
                .or_default()
                .push(position);
        }
        self.by_key
            .entry((record.kind(), record.id().to_string()))
            .or_insert(position);
        self.hashes.insert(record.hash().to_string());
        self.records.push(record);
        position as u64
    }

    fn collect(&self, positions: Option<&Vec<usize>>) -> Vec<ComplianceRecord> {
        positions
            .map(|positions| positions.iter().map(|&i| self.records[i].clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn for_user(&self, user_id: &str) -> Vec<ComplianceRecord> {
        self.collect(self.by_user.get(user_id))
    }

    pub(crate) fn for_order(&self, order_id: &str) -> Vec<ComplianceRecord> {
        self.collect(self.by_order.get(order_id))
    }

    pub(crate) fn find(&self, kind: RecordKind, id: &str) -> Option<ComplianceRecord> {
        self.by_key
            .get(&(kind, id.to_string()))
            .map(|&i| self.records[i].clone())
    }

    pub(crate) fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ComplianceRecord> {
        self.records
            .iter()
            .filter(|record| record.timestamp() >= start && record.timestamp() <= end)
            .cloned()
            .collect()
    }

    pub(crate) fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.by_user.keys().cloned().collect();
        users.sort();
        users
    }

    pub(crate) fn len(&self) -> u64 {
        self.records.len() as u64
    }
}

/// Volatile record store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    index: RwLock<RecordIndex>,
    closed: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn append(&self, record: &ComplianceRecord) -> Result<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LedgerError::store_closed());
        }
        let mut index = self.index.write().await;
        index.check_insertable(record)?;
        let seq = index.insert(record.clone());
        debug!("Stored {} at position {}", record.summary(), seq);
        Ok(seq)
    }

    async fn records_for_user(&self, user_id: &str) -> Result<Vec<ComplianceRecord>> {
        Ok(self.index.read().await.for_user(user_id))
    }

    async fn records_for_order(&self, order_id: &str) -> Result<Vec<ComplianceRecord>> {
        Ok(self.index.read().await.for_order(order_id))
    }

    async fn find(&self, kind: RecordKind, id: &str) -> Result<Option<ComplianceRecord>> {
        Ok(self.index.read().await.find(kind, id))
    }

    async fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ComplianceRecord>> {
        Ok(self.index.read().await.in_range(start, end))
    }

    async fn users(&self) -> Result<Vec<String>> {
        Ok(self.index.read().await.users())
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.index.read().await.len())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
