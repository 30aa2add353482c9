//! Ledger
//!
//! The write-once store of compliance records. Appends are linked into the
//! user's hash chain through a compare-and-swap on the chain head; reads
//! return records in link order.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, Result};
use crate::ledger::hasher::ChainHasher;
use crate::ledger::heads::{ChainHeadStore, MemoryChainHeadStore, GENESIS_HEAD};
use crate::ledger::record::{ComplianceRecord, RecordKind, UserHistory};
use crate::ledger::store::{MemoryRecordStore, RecordStore};
use crate::ledger::verify::{link_chain, ChainVerification, LinkedChain};

pub const DEFAULT_MAX_APPEND_RETRIES: u32 = 16;

/// A record rejected for integrity reasons, kept aside for review.
#[derive(Debug, Clone)]
pub struct QuarantinedRecord {
    pub record: ComplianceRecord,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn RecordStore>,
    heads: Arc<dyn ChainHeadStore>,
    max_append_retries: u32,
    quarantine: Arc<Mutex<Vec<QuarantinedRecord>>>,
    /// Per-user writer locks. A head is never handed to another appender of
    /// this process before the record it names is durable.
    append_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Ledger {
    /// Create a ledger over stores that are known to agree (e.g. both empty).
    pub fn new(store: Arc<dyn RecordStore>, heads: Arc<dyn ChainHeadStore>) -> Self {
        Self {
            store,
            heads,
            max_append_retries: DEFAULT_MAX_APPEND_RETRIES,
            quarantine: Arc::new(Mutex::new(Vec::new())),
            append_locks: Arc::new(DashMap::new()),
        }
    }

    /// Volatile ledger backed by the in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryChainHeadStore::new()),
        )
    }

    /// Open a ledger over existing stores, reconciling chain heads with the
    /// records that actually landed.
    pub async fn open(store: Arc<dyn RecordStore>, heads: Arc<dyn ChainHeadStore>) -> Result<Self> {
        let ledger = Self::new(store, heads);
        ledger.reconcile_heads().await?;
        Ok(ledger)
    }

    pub fn with_max_append_retries(mut self, max_append_retries: u32) -> Self {
        self.max_append_retries = max_append_retries.max(1);
        self
    }

    pub fn max_append_retries(&self) -> u32 {
        self.max_append_retries
    }

    async fn reconcile_heads(&self) -> Result<()> {
        let mut users: BTreeSet<String> = self.store.users().await?.into_iter().collect();
        users.extend(self.heads.users().await?);

        let mut repaired = 0;
        for user_id in &users {
            let chain = self.checked_chain(user_id).await?;
            let tip = chain.tip();
            let head = self.heads.get_head(user_id).await?;
            if head == tip {
                continue;
            }

            if head == GENESIS_HEAD {
                info!("Seeding chain head for user {} from {} stored records", user_id, chain.ordered.len());
            } else {
                warn!(
                    "Chain head of user {} points at a record that never landed; rolling back to stored tip",
                    user_id
                );
            }
            self.heads.set_head(user_id, tip, &head).await?;
            repaired += 1;
        }

        info!("Reconciled chain heads for {} users ({} repaired)", users.len(), repaired);
        Ok(())
    }

    /// Link `record` into its user's chain and store it.
    ///
    /// Any inbound `hash`/`previous_hash` is overwritten and decimal fields are
    /// rounded to their canonical precision. Returns the stored record.
    ///
    /// Appends for one user are serialized within the process; the head CAS
    /// guards against writers sharing the head store from elsewhere.
    pub async fn append(&self, record: impl Into<ComplianceRecord>) -> Result<ComplianceRecord> {
        let mut record = record.into();
        ChainHasher::normalize(&mut record)?;
        let user_id = record.user_id().to_string();

        let user_lock = self.append_locks.entry(user_id.clone()).or_default().clone();
        let _writer = user_lock.lock().await;

        for attempt in 1..=self.max_append_retries {
            let head = self.heads.get_head(&user_id).await?;
            record.set_previous_hash(head.clone());
            let hash = record.calculate_hash()?;
            record.set_hash(hash);

            if !record.verify_hash() {
                let reason = "hash does not recompute after linking".to_string();
                let err = LedgerError::IntegrityViolation(format!(
                    "{} {}: {}",
                    record.kind(),
                    record.id(),
                    reason
                ));
                self.quarantine_record(record, reason).await;
                return Err(err);
            }

            match self.heads.set_head(&user_id, record.hash(), &head).await {
                Ok(()) => {}
                Err(LedgerError::ChainForkDetected { .. }) => {
                    debug!("Head of user {} moved during append (attempt {})", user_id, attempt);
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) => return Err(e),
            }

            if let Err(e) = self.store.append(&record).await {
                return Err(self.roll_back_head(record, &head, e).await);
            }

            debug!("Appended {} for user {} after {} attempt(s)", record.summary(), user_id, attempt);
            return Ok(record);
        }

        error!(
            "Append of {} for user {} gave up after {} conflicting attempts",
            record.summary(),
            user_id,
            self.max_append_retries
        );
        Err(LedgerError::ChainForkDetected {
            user_id,
            attempts: self.max_append_retries,
        })
    }

    /// Undo the head swap of an append whose store write failed.
    ///
    /// If the head has moved on, another writer already linked onto a record
    /// that never landed; the record is quarantined and the chain reported
    /// broken instead of the write being retried.
    async fn roll_back_head(&self, record: ComplianceRecord, previous: &str, cause: LedgerError) -> LedgerError {
        let user_id = record.user_id().to_string();
        match self.heads.set_head(&user_id, previous, record.hash()).await {
            Ok(()) => {
                warn!("Store write of {} failed; chain head of user {} rolled back", record.summary(), user_id);
                match cause {
                    LedgerError::StorageUnavailable(_) | LedgerError::IntegrityViolation(_) => cause,
                    other => LedgerError::StorageUnavailable(other.to_string()),
                }
            }
            Err(rollback) => {
                error!("Failed to roll back chain head of user {}: {}", user_id, rollback);
                let err = LedgerError::IntegrityViolation(format!(
                    "{} {} was linked into the chain of user {} but not stored: {}",
                    record.kind(),
                    record.id(),
                    user_id,
                    cause
                ));
                self.quarantine_record(record, format!("store write failed: {}", cause)).await;
                err
            }
        }
    }

    /// The user's records grouped by kind, each group in append order.
    pub async fn get_user_history(&self, user_id: &str) -> Result<UserHistory> {
        let chain = self.checked_chain(user_id).await?;
        Ok(UserHistory::from_chain(user_id, chain.ordered))
    }

    /// Every stored record of the order, across users and kinds, in storage order.
    pub async fn get_records_for_order(&self, order_id: &str) -> Result<Vec<ComplianceRecord>> {
        self.store.records_for_order(order_id).await
    }

    /// Records of the order that are linked into their user's chain.
    ///
    /// The order scan happens first and fixes the snapshot. Scanned records
    /// whose predecessor has not landed yet are left out; any record failing
    /// hash verification fails the call.
    pub async fn linked_records_for_order(&self, order_id: &str) -> Result<Vec<ComplianceRecord>> {
        let scanned = self.store.records_for_order(order_id).await?;

        let users: BTreeSet<String> = scanned.iter().map(|record| record.user_id().to_string()).collect();
        let mut chains = Vec::with_capacity(users.len());
        for user_id in users {
            let chain = self.checked_chain(&user_id).await?;
            chains.push((user_id, chain));
        }

        let total = scanned.len();
        let linked: Vec<ComplianceRecord> = scanned
            .into_iter()
            .filter(|record| {
                chains
                    .iter()
                    .find(|(user_id, _)| *user_id == record.user_id())
                    .map(|(_, chain)| chain.contains_hash(record.hash()))
                    .unwrap_or(false)
            })
            .collect();

        if linked.len() < total {
            debug!(
                "Deferred {} unlinked records of order {}",
                total - linked.len(),
                order_id
            );
        }
        Ok(linked)
    }

    /// Records whose timestamp falls in `[start, end]`, in storage order.
    pub async fn get_records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ComplianceRecord>> {
        self.store.records_in_range(start, end).await
    }

    /// Recompute the hash of one stored record. Unknown records are `false`.
    pub async fn verify_record(&self, kind: RecordKind, id: &str) -> Result<bool> {
        match self.store.find(kind, id).await? {
            Some(record) => {
                let valid = record.verify_hash();
                if !valid {
                    warn!("{} {} fails hash verification", kind, id);
                }
                Ok(valid)
            }
            None => Ok(false),
        }
    }

    pub async fn verify_user_chain(&self, user_id: &str) -> Result<ChainVerification> {
        let chain = link_chain(self.store.records_for_user(user_id).await?);
        let verification = ChainVerification::from_chain(user_id, &chain);
        if verification.is_valid {
            info!("{}", verification.summary());
        } else {
            warn!("{}", verification.summary());
        }
        Ok(verification)
    }

    pub async fn quarantined(&self) -> Vec<QuarantinedRecord> {
        self.quarantine.lock().await.clone()
    }

    pub async fn users(&self) -> Result<Vec<String>> {
        self.store.users().await
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.len().await
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    /// Link the user's stored records, quarantining tampered ones.
    async fn checked_chain(&self, user_id: &str) -> Result<LinkedChain> {
        let chain = link_chain(self.store.records_for_user(user_id).await?);
        if !chain.tampered.is_empty() {
            for record in &chain.tampered {
                self.quarantine_record(record.clone(), "stored hash does not recompute".to_string())
                    .await;
            }
        }
        if !chain.forks.is_empty() {
            error!("Chain of user {} has {} forked records", user_id, chain.forks.len());
        }
        chain.ensure_intact(user_id)?;
        Ok(chain)
    }

    async fn quarantine_record(&self, record: ComplianceRecord, reason: String) {
        let mut quarantine = self.quarantine.lock().await;
        if quarantine
            .iter()
            .any(|q| q.record.kind() == record.kind() && q.record.id() == record.id() && q.record.hash() == record.hash())
        {
            return;
        }
        error!("Quarantined {}: {}", record.summary(), reason);
        quarantine.push(QuarantinedRecord {
            record,
            reason,
            quarantined_at: Utc::now(),
        });
    }
}
