use thiserror::Error;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::EncodingError(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageUnavailable(format!("Database error: {}", err))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(format!("I/O error: {}", err))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

/// Error taxonomy of the compliance ledger.
///
/// Messages name records by kind and id only; hash and signature material
/// never appears in a rendered error.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Chain fork detected for user {user_id} after {attempts} append attempts")]
    ChainForkDetected { user_id: String, attempts: u32 },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Signing unavailable: {0}")]
    SigningUnavailable(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

impl LedgerError {
    /// Whether the caller may retry the operation with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    pub fn missing_field(field: &str) -> Self {
        Self::EncodingError(format!("Required field `{}` is empty", field))
    }

    pub fn non_finite(field: &str) -> Self {
        Self::EncodingError(format!("Field `{}` is not a finite number", field))
    }

    pub fn store_closed() -> Self {
        Self::StorageUnavailable("Record store is closed".to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
