//! Merkle Tree for Evidence Packages
//!
//! Binary SHA-256 tree over record hashes. Leaves hash the record hash's hex
//! text, parents hash the concatenated hex of their children, and a level
//! with an odd count pairs its last node with itself.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ledger::hasher::sha256_hex;

/// Root of a tree with no leaves: SHA-256 of the empty string.
pub const EMPTY_MERKLE_ROOT: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub fn leaf_hash(record_hash: &str) -> String {
    sha256_hex(record_hash.as_bytes())
}

pub fn parent_hash(left: &str, right: &str) -> String {
    let mut combined = String::with_capacity(left.len() + right.len());
    combined.push_str(left);
    combined.push_str(right);
    sha256_hex(combined.as_bytes())
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves; the last level holds the root.
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    pub fn from_record_hashes<S: AsRef<str>>(record_hashes: &[S]) -> Self {
        if record_hashes.is_empty() {
            return Self { levels: Vec::new() };
        }

        let mut levels = vec![record_hashes
            .iter()
            .map(|hash| leaf_hash(hash.as_ref()))
            .collect::<Vec<_>>()];

        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next: Vec<String> = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    parent_hash(left, pair.get(1).unwrap_or(left))
                })
                .collect();
            levels.push(next);
        }

        debug!("Built Merkle tree: {} leaves, {} levels", record_hashes.len(), levels.len());
        Self { levels }
    }

    pub fn root(&self) -> String {
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_else(|| EMPTY_MERKLE_ROOT.to_string())
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Membership proof for the leaf at `index`.
    pub fn proof(&self, index: usize, record_hash: &str) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut steps = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in &self.levels[..self.depth()] {
            let (sibling, side) = if position % 2 == 0 {
                (level.get(position + 1).unwrap_or(&level[position]), Side::Right)
            } else {
                (&level[position - 1], Side::Left)
            };
            steps.push(ProofStep {
                hash: sibling.clone(),
                side,
            });
            position /= 2;
        }

        Some(MerkleProof {
            record_hash: record_hash.to_string(),
            leaf_index: index,
            steps,
            root: self.root(),
        })
    }
}

pub fn merkle_root<S: AsRef<str>>(record_hashes: &[S]) -> String {
    MerkleTree::from_record_hashes(record_hashes).root()
}

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: String,
    pub side: Side,
}

/// Proof that a record hash is a leaf of the tree with root `root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub record_hash: String,
    pub leaf_index: usize,
    pub steps: Vec<ProofStep>,
    pub root: String,
}

impl MerkleProof {
    pub fn computed_root(&self) -> String {
        self.steps
            .iter()
            .fold(leaf_hash(&self.record_hash), |current, step| match step.side {
                Side::Left => parent_hash(&step.hash, &current),
                Side::Right => parent_hash(&current, &step.hash),
            })
    }

    /// Verify this proof
    pub fn verify(&self) -> bool {
        self.computed_root() == self.root
    }

    pub fn size(&self) -> usize {
        self.steps.len()
    }

    pub fn summary(&self) -> String {
        format!("Merkle proof for leaf {}: {} steps", self.leaf_index, self.steps.len())
    }
}
