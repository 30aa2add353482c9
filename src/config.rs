use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::crypto::{Secp256k1Signer, Signer};
use crate::database::Database;
use crate::error::{LedgerError, Result};
use crate::ledger::{JournalRecordStore, Ledger, MemoryChainHeadStore, DEFAULT_MAX_APPEND_RETRIES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Journal,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub backend: StorageBackend,
    pub journal_path: PathBuf,
    pub database_url: String,
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,
    pub max_append_retries: u32,
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Journal,
            journal_path: PathBuf::from("data/compliance-ledger.jsonl"),
            database_url: "sqlite://compliance-ledger.db".to_string(),
            signing_key_path: None,
            max_append_retries: DEFAULT_MAX_APPEND_RETRIES,
            log_filter: "compliance_ledger=info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Defaults, then the optional file, then `LEDGER_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("backend", "journal")?
            .set_default("journal_path", defaults.journal_path.to_string_lossy().to_string())?
            .set_default("database_url", defaults.database_url)?
            .set_default("max_append_retries", defaults.max_append_retries as i64)?
            .set_default("log_filter", defaults.log_filter)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: LedgerConfig = builder
            .add_source(Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_append_retries == 0 {
            return Err(LedgerError::ConfigError(
                "max_append_retries must be at least 1".to_string(),
            ));
        }
        match self.backend {
            StorageBackend::Journal if self.journal_path.as_os_str().is_empty() => Err(
                LedgerError::ConfigError("journal backend needs a journal_path".to_string()),
            ),
            StorageBackend::Sqlite if self.database_url.trim().is_empty() => Err(
                LedgerError::ConfigError("sqlite backend needs a database_url".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Open the configured stores and reconcile chain heads.
    pub async fn open_ledger(&self) -> Result<Ledger> {
        let ledger = match self.backend {
            StorageBackend::Memory => Ledger::in_memory(),
            StorageBackend::Journal => {
                let store = JournalRecordStore::open(&self.journal_path)?;
                Ledger::open(Arc::new(store), Arc::new(MemoryChainHeadStore::new())).await?
            }
            StorageBackend::Sqlite => {
                let db = Database::new(&self.database_url).await?;
                Ledger::open(Arc::new(db.record_store()), Arc::new(db.head_store())).await?
            }
        };
        info!("Opened {:?} ledger", self.backend);
        Ok(ledger.with_max_append_retries(self.max_append_retries))
    }

    /// Signer from the configured key file. Fails closed when none is set.
    pub fn load_signer(&self) -> Result<Arc<dyn Signer>> {
        let path = self.signing_key_path.as_ref().ok_or_else(|| {
            LedgerError::SigningUnavailable("no signing_key_path configured".to_string())
        })?;
        Ok(Arc::new(Secp256k1Signer::from_key_file(path)?))
    }
}
