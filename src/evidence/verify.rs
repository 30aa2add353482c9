//! Evidence Package Verification
//!
//! Independent re-checking of an exported package: signature, order chain,
//! Merkle root, and the records themselves.

use std::collections::HashMap;
use tracing::{info, warn};

use crate::crypto::Signer;
use crate::evidence::merkle::merkle_root;
use crate::evidence::package::EvidencePackage;
use crate::ledger::record::RecordKind;

#[derive(Debug, Clone)]
pub struct EvidenceVerification {
    pub order_id: String,
    pub record_count: usize,
    pub signature_valid: bool,
    pub chain_continuous: bool,
    pub root_hash_matches: bool,
    pub merkle_root_matches: bool,
    pub records_valid: bool,
    pub records_match_chain: bool,
    pub errors: Vec<String>,
}

impl EvidenceVerification {
    pub fn is_verified(&self) -> bool {
        self.signature_valid
            && self.chain_continuous
            && self.root_hash_matches
            && self.merkle_root_matches
            && self.records_valid
            && self.records_match_chain
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.is_verified() {
            format!("Evidence for order {} verified ({} records)", self.order_id, self.record_count)
        } else {
            format!(
                "Evidence for order {} FAILED verification: {}",
                self.order_id,
                self.errors.join("; ")
            )
        }
    }

    pub fn detailed_status(&self) -> String {
        let mark = |ok: bool| if ok { "ok" } else { "FAILED" };
        format!(
            "Signature: {}\nChain continuity: {}\nRoot hash: {}\nMerkle root: {}\nRecord hashes: {}\nRecords match chain: {}",
            mark(self.signature_valid),
            mark(self.chain_continuous),
            mark(self.root_hash_matches),
            mark(self.merkle_root_matches),
            mark(self.records_valid),
            mark(self.records_match_chain)
        )
    }
}

pub fn verify_evidence_package(package: &EvidencePackage, signer: &dyn Signer) -> EvidenceVerification {
    let mut errors = Vec::new();

    let signature_valid = match hex::decode(&package.signature) {
        Ok(signature) => signer.verify(&package.signature_message(), &signature),
        Err(_) => false,
    };
    if !signature_valid {
        errors.push("signature does not verify".to_string());
    }

    let mut chain_continuous = true;
    let mut expected_previous = "";
    for (i, node) in package.hash_chain.iter().enumerate() {
        if node.previous_hash != expected_previous {
            errors.push(format!("hash chain broken at node {} ({} {})", i, node.kind, node.id));
            chain_continuous = false;
            break;
        }
        expected_previous = &node.hash;
    }

    let tip = package.hash_chain.last().map(|node| node.hash.as_str()).unwrap_or("");
    let root_hash_matches = package.root_hash == tip;
    if !root_hash_matches {
        errors.push("root hash is not the chain tip".to_string());
    }

    let hashes: Vec<&str> = package.hash_chain.iter().map(|node| node.hash.as_str()).collect();
    let merkle_root_matches = merkle_root(&hashes) == package.merkle_root;
    if !merkle_root_matches {
        errors.push("merkle root does not recompute".to_string());
    }

    let records = package.records();
    let tampered: Vec<String> = records
        .iter()
        .filter(|record| !record.verify_hash())
        .map(|record| format!("{} {}", record.kind(), record.id()))
        .collect();
    let records_valid = tampered.is_empty();
    if !records_valid {
        errors.push(format!("records fail hash verification: {}", tampered.join(", ")));
    }

    let mut unmatched: HashMap<(RecordKind, &str, &str), usize> = HashMap::new();
    for record in &records {
        *unmatched.entry((record.kind(), record.id(), record.hash())).or_default() += 1;
    }
    let mut records_match_chain = records.len() == package.hash_chain.len();
    for node in &package.hash_chain {
        match unmatched.get_mut(&(node.kind, node.id.as_str(), node.hash.as_str())) {
            Some(count) if *count > 0 => *count -= 1,
            _ => {
                records_match_chain = false;
                break;
            }
        }
    }
    let misplaced_group = package
        .records_by_kind
        .iter()
        .any(|group| group.records.iter().any(|record| record.kind() != group.kind));
    if misplaced_group {
        records_match_chain = false;
    }
    if !records_match_chain {
        errors.push("records do not match the hash chain one to one".to_string());
    }
    let foreign: Vec<String> = records
        .iter()
        .filter(|record| record.order_id() != package.order_id)
        .map(|record| format!("{} {}", record.kind(), record.id()))
        .collect();
    if !foreign.is_empty() {
        records_match_chain = false;
        errors.push(format!("records belong to another order: {}", foreign.join(", ")));
    }

    let verification = EvidenceVerification {
        order_id: package.order_id.clone(),
        record_count: package.hash_chain.len(),
        signature_valid,
        chain_continuous,
        root_hash_matches,
        merkle_root_matches,
        records_valid,
        records_match_chain,
        errors,
    };

    if verification.is_verified() {
        info!("{}", verification.summary());
    } else {
        warn!("{}", verification.summary());
    }
    verification
}
