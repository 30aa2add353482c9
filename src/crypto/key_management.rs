//! Signing Key Files
//!
//! Secret keys are stored as a single line of hex. On Unix the file is
//! created with mode 0600.

use rand::rngs::OsRng;
use secp256k1::{PublicKey, SecretKey};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{LedgerError, Result};

pub fn generate_signing_key() -> SecretKey {
    SecretKey::new(&mut OsRng)
}

pub fn save_signing_key(path: impl AsRef<Path>, secret_key: &SecretKey) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, format!("{}\n", hex::encode(secret_key.secret_bytes())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    info!("Saved signing key to {:?}", path);
    Ok(())
}

pub fn load_signing_key(path: impl AsRef<Path>) -> Result<SecretKey> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        LedgerError::SigningUnavailable(format!("Cannot read signing key {:?}: {}", path, e))
    })?;
    let bytes = hex::decode(contents.trim())
        .map_err(|e| LedgerError::CryptoError(format!("Invalid key hex: {}", e)))?;
    SecretKey::from_slice(&bytes)
        .map_err(|e| LedgerError::CryptoError(format!("Invalid secret key: {}", e)))
}

/// Parse a compressed or uncompressed public key from hex.
pub fn parse_public_key(public_key_hex: &str) -> Result<PublicKey> {
    let bytes = hex::decode(public_key_hex.trim())
        .map_err(|e| LedgerError::CryptoError(format!("Invalid public key hex: {}", e)))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| LedgerError::CryptoError(format!("Invalid public key format: {}", e)))
}
