//! Chain Verification
//!
//! Utilities for ordering a user's stored records by their links and for
//! verifying chain integrity.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::ledger::heads::GENESIS_HEAD;
use crate::ledger::record::ComplianceRecord;

/// A user's stored records arranged by following links from the genesis head.
#[derive(Debug, Clone, Default)]
pub struct LinkedChain {
    /// Records reachable from genesis, in link order.
    pub ordered: Vec<ComplianceRecord>,
    /// Stored records whose predecessor is not reachable (yet).
    pub orphans: Vec<ComplianceRecord>,
    /// Records sharing a predecessor with an earlier-stored sibling.
    pub forks: Vec<ComplianceRecord>,
    /// Records whose stored hash does not match a recomputation.
    pub tampered: Vec<ComplianceRecord>,
}

impl LinkedChain {
    pub fn tip(&self) -> &str {
        self.ordered
            .last()
            .map(|record| record.hash())
            .unwrap_or(GENESIS_HEAD)
    }

    pub fn is_intact(&self) -> bool {
        self.forks.is_empty() && self.tampered.is_empty()
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.ordered.iter().any(|record| record.hash() == hash)
    }

    /// Fail unless the chain is free of forks and tampering.
    pub fn ensure_intact(&self, user_id: &str) -> Result<()> {
        if let Some(record) = self.tampered.first() {
            return Err(LedgerError::IntegrityViolation(format!(
                "{} {} of user {} fails hash verification",
                record.kind(),
                record.id(),
                user_id
            )));
        }
        if let Some(record) = self.forks.first() {
            return Err(LedgerError::IntegrityViolation(format!(
                "{} {} forks the chain of user {}",
                record.kind(),
                record.id(),
                user_id
            )));
        }
        Ok(())
    }
}

/// Arrange one user's records (in storage order) into link order.
///
/// When two records claim the same predecessor, the one stored first
/// continues the chain and the other is reported as a fork.
pub fn link_chain(records: Vec<ComplianceRecord>) -> LinkedChain {
    let mut chain = LinkedChain::default();

    let mut children: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        if !record.verify_hash() {
            chain.tampered.push(record.clone());
        }
        children
            .entry(record.previous_hash().to_string())
            .or_default()
            .push(i);
    }

    let mut visited: HashSet<usize> = HashSet::new();
    let mut expected = GENESIS_HEAD.to_string();
    while let Some(candidates) = children.get(&expected) {
        let next = candidates[0];
        if !visited.insert(next) {
            break;
        }
        for &sibling in &candidates[1..] {
            chain.forks.push(records[sibling].clone());
            visited.insert(sibling);
        }
        expected = records[next].hash().to_string();
        chain.ordered.push(records[next].clone());
    }

    for (i, record) in records.into_iter().enumerate() {
        if !visited.contains(&i) {
            chain.orphans.push(record);
        }
    }

    if !chain.orphans.is_empty() {
        debug!("{} stored records are not yet reachable from genesis", chain.orphans.len());
    }

    chain
}

/// Detailed verification result for one user's chain.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    pub user_id: String,
    pub is_valid: bool,
    pub entry_count: usize,
    pub linked_count: usize,
    pub tampered_ids: Vec<String>,
    pub orphaned_ids: Vec<String>,
    pub forked_ids: Vec<String>,
    pub error_message: Option<String>,
}

impl ChainVerification {
    pub fn from_chain(user_id: &str, chain: &LinkedChain) -> Self {
        let ids = |records: &[ComplianceRecord]| -> Vec<String> {
            records.iter().map(|r| format!("{}:{}", r.kind(), r.id())).collect()
        };

        let tampered_ids = ids(&chain.tampered);
        let orphaned_ids = ids(&chain.orphans);
        let forked_ids = ids(&chain.forks);
        let entry_count = chain.ordered.len() + chain.orphans.len() + chain.forks.len();

        let error_message = if !tampered_ids.is_empty() {
            Some(format!("{} tampered record(s)", tampered_ids.len()))
        } else if !forked_ids.is_empty() {
            Some(format!("{} forked record(s)", forked_ids.len()))
        } else if !orphaned_ids.is_empty() {
            Some(format!("{} record(s) not linked to the chain", orphaned_ids.len()))
        } else {
            None
        };

        Self {
            user_id: user_id.to_string(),
            is_valid: error_message.is_none(),
            entry_count,
            linked_count: chain.ordered.len(),
            tampered_ids,
            orphaned_ids,
            forked_ids,
            error_message,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.is_valid {
            format!("Chain of {} is valid ({} entries)", self.user_id, self.entry_count)
        } else {
            format!(
                "Chain of {} is invalid ({} entries): {}",
                self.user_id,
                self.entry_count,
                self.error_message.as_deref().unwrap_or("Unknown error")
            )
        }
    }

    /// Get detailed status
    pub fn detailed_status(&self) -> String {
        format!(
            "Entries: {}\nLinked: {}\nTampered: {}\nOrphaned: {}\nForked: {}\nError: {}",
            self.entry_count,
            self.linked_count,
            self.tampered_ids.join(", "),
            self.orphaned_ids.join(", "),
            self.forked_ids.join(", "),
            self.error_message.as_deref().unwrap_or("None")
        )
    }
}
