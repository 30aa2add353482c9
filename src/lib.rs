pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod evidence;
pub mod ledger;

pub use config::{LedgerConfig, StorageBackend};
pub use crypto::{Secp256k1Signer, Signer};
pub use error::{LedgerError, Result};
pub use evidence::{verify_evidence_package, EvidenceAssembler, EvidencePackage, EvidenceVerification};
pub use ledger::{ComplianceRecord, Ledger, RecordKind, UserHistory};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
