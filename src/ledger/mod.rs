//! Compliance Ledger
//!
//! Tamper-evident, append-only storage of compliance records with a
//! per-user SHA-256 hash chain.

pub mod hasher;
pub mod heads;
pub mod journal;
pub mod record;
pub mod service;
pub mod store;
pub mod verify;

pub use hasher::{sha256_hex, ChainHasher};
pub use heads::{ChainHeadStore, MemoryChainHeadStore, GENESIS_HEAD};
pub use journal::JournalRecordStore;
pub use record::{
    AccessCheckRecord, AppealRecord, AppealStatus, ComplianceRecord, EvidenceItem,
    GeofenceCheckRecord, RecordKind, UserHistory, ValidationRecord, ValidationStatus,
};
pub use service::{Ledger, QuarantinedRecord, DEFAULT_MAX_APPEND_RETRIES};
pub use store::{MemoryRecordStore, RecordStore};
pub use verify::{link_chain, ChainVerification, LinkedChain};
