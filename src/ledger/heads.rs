//! Chain Heads
//!
//! Per-user chain head tracking. `set_head` is a compare-and-swap and is the
//! only serialization point between concurrent appends for the same user.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{LedgerError, Result};

/// Head value of a user that has no records yet.
pub const GENESIS_HEAD: &str = "";

#[async_trait]
pub trait ChainHeadStore: Send + Sync {
    /// Current head hash for `user_id`, or [`GENESIS_HEAD`].
    async fn get_head(&self, user_id: &str) -> Result<String>;

    /// Swap the head to `new_hash` iff it still equals `expected_previous_head`.
    ///
    /// Fails with [`LedgerError::ChainForkDetected`] when another append won the race.
    async fn set_head(&self, user_id: &str, new_hash: &str, expected_previous_head: &str) -> Result<()>;

    /// Users whose head is past genesis, sorted.
    async fn users(&self) -> Result<Vec<String>>;
}

/// In-process head store. Users are spread over `DashMap` shards, so appends
/// for different users do not contend on a single lock.
#[derive(Debug, Default)]
pub struct MemoryChainHeadStore {
    heads: DashMap<String, String>,
}

impl MemoryChainHeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }
}

#[async_trait]
impl ChainHeadStore for MemoryChainHeadStore {
    async fn get_head(&self, user_id: &str) -> Result<String> {
        Ok(self
            .heads
            .get(user_id)
            .map(|head| head.value().clone())
            .unwrap_or_else(|| GENESIS_HEAD.to_string()))
    }

    async fn set_head(&self, user_id: &str, new_hash: &str, expected_previous_head: &str) -> Result<()> {
        // The entry guard holds the shard lock for the whole compare-and-swap
        match self.heads.entry(user_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get() != expected_previous_head {
                    debug!("Chain head moved for user {}", user_id);
                    return Err(LedgerError::ChainForkDetected {
                        user_id: user_id.to_string(),
                        attempts: 1,
                    });
                }
                if new_hash.is_empty() {
                    occupied.remove();
                } else {
                    occupied.insert(new_hash.to_string());
                }
                Ok(())
            }
            Entry::Vacant(vacant) => {
                if !expected_previous_head.is_empty() {
                    debug!("Chain head missing for user {}", user_id);
                    return Err(LedgerError::ChainForkDetected {
                        user_id: user_id.to_string(),
                        attempts: 1,
                    });
                }
                if !new_hash.is_empty() {
                    vacant.insert(new_hash.to_string());
                }
                Ok(())
            }
        }
    }

    async fn users(&self) -> Result<Vec<String>> {
        let mut users: Vec<String> = self.heads.iter().map(|head| head.key().clone()).collect();
        users.sort();
        Ok(users)
    }
}
