//! Evidence Assembler
//!
//! Builds signed evidence packages from the ledger. Packages are derived
//! data: building one never writes to the ledger.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

use crate::crypto::Signer;
use crate::error::{LedgerError, Result};
use crate::evidence::merkle::merkle_root;
use crate::evidence::package::{
    build_hash_chain, evidence_order, group_by_kind, signature_message, EvidencePackage,
};
use crate::ledger::Ledger;

#[derive(Clone)]
pub struct EvidenceAssembler {
    ledger: Ledger,
    signer: Arc<dyn Signer>,
}

impl EvidenceAssembler {
    pub fn new(ledger: Ledger, signer: Arc<dyn Signer>) -> Self {
        Self { ledger, signer }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Build and sign the evidence package of `order_id`.
    ///
    /// Only records linked into their user's chain at scan time are included.
    /// Fails closed: no package is returned without a signature.
    pub async fn build_evidence_package(&self, order_id: &str) -> Result<EvidencePackage> {
        let mut records = self.ledger.linked_records_for_order(order_id).await?;
        records.sort_by(evidence_order);

        let hash_chain = build_hash_chain(&records);
        let hashes: Vec<&str> = hash_chain.iter().map(|node| node.hash.as_str()).collect();
        let merkle_root = merkle_root(&hashes);
        let root_hash = hash_chain
            .last()
            .map(|node| node.hash.clone())
            .unwrap_or_default();

        let signature = self
            .signer
            .sign(&signature_message(order_id, &merkle_root))
            .await
            .map_err(|e| {
                error!("Refusing to build unsigned evidence package for order {}: {}", order_id, e);
                match e {
                    LedgerError::SigningUnavailable(_) => e,
                    other => LedgerError::SigningUnavailable(other.to_string()),
                }
            })?;

        let package = EvidencePackage {
            order_id: order_id.to_string(),
            generated_at: Utc::now(),
            records_by_kind: group_by_kind(&records),
            hash_chain,
            root_hash,
            merkle_root,
            signature: hex::encode(signature),
        };

        info!("Built evidence package for order {} with {} records", order_id, package.record_count());
        Ok(package)
    }
}
