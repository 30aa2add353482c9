//! Evidence Packages
//!
//! Signed, Merkle-rooted bundles of the compliance records of one order,
//! for audit export and dispute resolution.

pub mod assembler;
pub mod merkle;
pub mod package;
pub mod verify;

pub use assembler::EvidenceAssembler;
pub use merkle::{merkle_root, MerkleProof, MerkleTree, ProofStep, Side, EMPTY_MERKLE_ROOT};
pub use package::{EvidencePackage, HashChainNode, RecordGroup};
pub use verify::{verify_evidence_package, EvidenceVerification};
