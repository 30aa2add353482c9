//! Signing for evidence packages.

pub mod key_management;
pub mod signatures;

use async_trait::async_trait;

use crate::error::Result;

pub use key_management::{generate_signing_key, load_signing_key, parse_public_key, save_signing_key};
pub use signatures::Secp256k1Signer;

/// Detached signatures over arbitrary messages.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `message`. Fails with `SigningUnavailable` when no key is at hand.
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}
