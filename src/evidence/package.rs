//! Evidence Packages
//!
//! The exported, signed bundle of every linked record belonging to one order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::Result;
use crate::evidence::merkle::{MerkleProof, MerkleTree};
use crate::ledger::record::{ComplianceRecord, RecordKind};

/// One link of an order-scoped hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashChainNode {
    pub id: String,
    pub kind: RecordKind,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordGroup {
    pub kind: RecordKind,
    pub records: Vec<ComplianceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub order_id: String,
    pub generated_at: DateTime<Utc>,
    /// All four kinds, in tag order; each group in chain order.
    pub records_by_kind: Vec<RecordGroup>,
    pub hash_chain: Vec<HashChainNode>,
    /// Hash of the last chain node, or empty for an order without records.
    pub root_hash: String,
    pub merkle_root: String,
    /// Lower-case hex.
    pub signature: String,
}

/// Total order of records inside an evidence package.
pub fn evidence_order(a: &ComplianceRecord, b: &ComplianceRecord) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| a.kind().as_str().cmp(b.kind().as_str()))
        .then_with(|| a.id().cmp(b.id()))
        .then_with(|| a.hash().cmp(b.hash()))
}

/// The bytes covered by a package signature.
pub fn signature_message(order_id: &str, merkle_root: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(order_id.len() + merkle_root.len());
    message.extend_from_slice(order_id.as_bytes());
    message.extend_from_slice(merkle_root.as_bytes());
    message
}

/// Project records (already in evidence order) onto an order-scoped chain.
pub fn build_hash_chain(records: &[ComplianceRecord]) -> Vec<HashChainNode> {
    let mut previous_hash = String::new();
    records
        .iter()
        .map(|record| HashChainNode {
            id: record.id().to_string(),
            kind: record.kind(),
            hash: record.hash().to_string(),
            previous_hash: std::mem::replace(&mut previous_hash, record.hash().to_string()),
            timestamp: record.timestamp(),
        })
        .collect()
}

/// Split records (in evidence order) into one group per kind.
pub fn group_by_kind(records: &[ComplianceRecord]) -> Vec<RecordGroup> {
    RecordKind::all()
        .into_iter()
        .map(|kind| RecordGroup {
            kind,
            records: records
                .iter()
                .filter(|record| record.kind() == kind)
                .cloned()
                .collect(),
        })
        .collect()
}

impl EvidencePackage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn record_count(&self) -> usize {
        self.hash_chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash_chain.is_empty()
    }

    /// Included records in chain order.
    pub fn records(&self) -> Vec<&ComplianceRecord> {
        let mut records: Vec<&ComplianceRecord> = self
            .records_by_kind
            .iter()
            .flat_map(|group| group.records.iter())
            .collect();
        records.sort_by(|a, b| evidence_order(a, b));
        records
    }

    pub fn signature_message(&self) -> Vec<u8> {
        signature_message(&self.order_id, &self.merkle_root)
    }

    pub fn merkle_tree(&self) -> MerkleTree {
        let hashes: Vec<&str> = self.hash_chain.iter().map(|node| node.hash.as_str()).collect();
        MerkleTree::from_record_hashes(&hashes)
    }

    /// Proof that the record with `record_id` is covered by `merkle_root`.
    pub fn membership_proof(&self, record_id: &str) -> Option<MerkleProof> {
        let index = self.hash_chain.iter().position(|node| node.id == record_id)?;
        self.merkle_tree().proof(index, &self.hash_chain[index].hash)
    }

    pub fn summary(&self) -> String {
        format!(
            "Evidence for order {}: {} records, generated {}",
            self.order_id,
            self.hash_chain.len(),
            self.generated_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::record::{AccessCheckRecord, AppealRecord};
    use chrono::TimeZone;

    fn sealed(record: impl Into<ComplianceRecord>) -> ComplianceRecord {
        let mut record = record.into();
        let hash = record.calculate_hash().unwrap();
        record.set_hash(hash);
        record
    }

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, second).unwrap()
    }

    #[test]
    fn test_evidence_order_tie_breaks() {
        let access = sealed(AccessCheckRecord {
            id: "z".to_string(),
            user_id: "u1".to_string(),
            timestamp: at(0),
            ..Default::default()
        });
        let appeal = sealed(AppealRecord {
            id: "a".to_string(),
            user_id: "u1".to_string(),
            timestamp: at(0),
            ..Default::default()
        });
        let later = sealed(AccessCheckRecord {
            id: "a".to_string(),
            user_id: "u1".to_string(),
            timestamp: at(1),
            ..Default::default()
        });

        let mut records = vec![later.clone(), appeal.clone(), access.clone()];
        records.sort_by(evidence_order);
        let ids: Vec<(&str, RecordKind)> = records.iter().map(|r| (r.id(), r.kind())).collect();
        assert_eq!(
            ids,
            vec![
                ("z", RecordKind::AccessCheck),
                ("a", RecordKind::Appeal),
                ("a", RecordKind::AccessCheck),
            ]
        );
    }

    #[test]
    fn test_hash_chain_projection() {
        let records: Vec<ComplianceRecord> = (0..3)
            .map(|i| {
                sealed(AccessCheckRecord {
                    id: format!("r{}", i),
                    user_id: format!("u{}", i),
                    order_id: "o1".to_string(),
                    timestamp: at(i),
                    ..Default::default()
                })
            })
            .collect();

        let chain = build_hash_chain(&records);
        assert_eq!(chain[0].previous_hash, "");
        assert_eq!(chain[1].previous_hash, records[0].hash());
        assert_eq!(chain[2].previous_hash, records[1].hash());
        assert_eq!(chain[2].hash, records[2].hash());

        let groups = group_by_kind(&records);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].kind, RecordKind::AccessCheck);
        assert_eq!(groups[0].records.len(), 3);
        assert!(groups[1..].iter().all(|g| g.records.is_empty()));
    }

    #[test]
    fn test_signature_message_layout() {
        assert_eq!(signature_message("order-7", "abc"), b"order-7abc".to_vec());
    }
}
