pub mod manager;

pub use manager::{Identity, IdentityManager};

use crate::error::{CoreError, Result};
use crate::types::Address;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

/// Secret half of an ed25519 key pair. Used both for participant signing
/// identities and for per-match escrow accounts.
#[derive(Clone)]
pub struct KeyMaterial {
    key: SigningKey,
}

impl KeyMaterial {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let raw = hex::decode(secret_hex.trim())
            .map_err(|e| CoreError::crypto(format!("Invalid secret hex: {}", e)))?;
        let seed: [u8; 32] = raw
            .try_into()
            .map_err(|_| CoreError::crypto("Secret material must be 32 bytes"))?;
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_bytes(self.key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_bytes().to_vec()
    }
}

// Never expose secret material through Debug output.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address().short())
            .finish()
    }
}

/// Check that `signature` over `message` was produced by the holder of
/// `address`. Pure function, no state. Malformed keys or signatures verify
/// as `false` rather than erroring, so callers can treat the result as a
/// plain attestation outcome.
pub fn verify_signature(signature: &[u8], message: &[u8], address: &Address) -> bool {
    let key = match VerifyingKey::from_bytes(address.as_bytes()) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    key.verify_strict(message, &signature).is_ok()
}
