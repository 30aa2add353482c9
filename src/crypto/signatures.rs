use async_trait::async_trait;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

use crate::crypto::key_management::{generate_signing_key, load_signing_key};
use crate::crypto::Signer;
use crate::error::{LedgerError, Result};

/// ECDSA over secp256k1. Messages are SHA-256 hashed before signing and
/// signatures use the 64-byte compact encoding.
pub struct Secp256k1Signer {
    secp: Secp256k1<All>,
    secret_key: Option<SecretKey>,
    public_key: PublicKey,
}

impl Secp256k1Signer {
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secp,
            secret_key: Some(secret_key),
            public_key,
        }
    }

    /// Signer with a freshly generated key
    pub fn generate() -> Self {
        Self::from_secret_key(generate_signing_key())
    }

    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_secret_key(load_signing_key(path)?))
    }

    /// A signer that can only verify. `sign` fails closed.
    pub fn verifier(public_key: PublicKey) -> Self {
        Self {
            secp: Secp256k1::new(),
            secret_key: None,
            public_key,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    pub fn can_sign(&self) -> bool {
        self.secret_key.is_some()
    }

    fn message_digest(message: &[u8]) -> Result<Message> {
        let digest = Sha256::digest(message);
        Message::from_digest_slice(&digest)
            .map_err(|e| LedgerError::CryptoError(format!("Invalid message hash: {}", e)))
    }

    pub fn sign_blocking(&self, message: &[u8]) -> Result<Vec<u8>> {
        let secret_key = self.secret_key.as_ref().ok_or_else(|| {
            LedgerError::SigningUnavailable("signer holds no secret key".to_string())
        })?;
        let digest = Self::message_digest(message)?;
        let signature = self.secp.sign_ecdsa(&digest, secret_key);
        debug!("Signed {} byte message", message.len());
        Ok(signature.serialize_compact().to_vec())
    }
}

#[async_trait]
impl Signer for Secp256k1Signer {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.sign_blocking(message)
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_compact(signature) else {
            return false;
        };
        let Ok(digest) = Self::message_digest(message) else {
            return false;
        };
        self.secp
            .verify_ecdsa(&digest, &signature, &self.public_key)
            .is_ok()
    }
}
