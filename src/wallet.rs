//! Signing keys for fee payers and signature-authorized account updates

use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;

use crate::tx_builder::TransactionBuilderError;
use crate::types::PublicKey;

/// Produces signatures for one account key
pub trait TransactionSigner: Send + Sync + fmt::Debug {
    fn public_key(&self) -> PublicKey;

    /// Sign `message`, returning the base58-encoded signature
    fn sign(&self, message: &[u8]) -> Result<String, TransactionBuilderError>;
}

/// Ed25519 key held in memory
#[derive(Clone)]
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_secret_bytes(secret: [u8; 32]) -> Result<Self> {
        if secret.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid secret key: all-zero key rejected");
        }
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    /// Load a key file: a JSON byte array or raw bytes, either the 32-byte
    /// secret or the 64-byte secret+public keypair form
    pub fn from_file(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read key file: {}", path))?;

        let raw = match serde_json::from_slice::<Vec<u8>>(&bytes) {
            Ok(json) => json,
            Err(_) if bytes.len() == 32 || bytes.len() == 64 => bytes,
            Err(e) => return Err(e).context("Failed to parse key file JSON"),
        };

        let secret: [u8; 32] = match raw.len() {
            32 | 64 => raw[..32]
                .try_into()
                .context("Invalid secret key bytes")?,
            other => anyhow::bail!("Invalid key length: expected 32 or 64 bytes, got {}", other),
        };
        let signer = Self::from_secret_bytes(secret)?;

        if raw.len() == 64 && raw[32..] != signer.key.verifying_key().to_bytes()[..] {
            anyhow::bail!("Key file public half does not match its secret half");
        }
        Ok(signer)
    }

    /// Fresh random key
    pub fn random() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }
}

impl TransactionSigner for Ed25519Signer {
    fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Result<String, TransactionBuilderError> {
        let signature = self.key.try_sign(message).map_err(|e| {
            TransactionBuilderError::Signing(format!("{}: {}", self.public_key(), e))
        })?;
        Ok(bs58::encode(signature.to_bytes()).into_string())
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key().to_base58())
            .finish_non_exhaustive()
    }
}

/// Check a base58 signature produced by `TransactionSigner::sign`
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &str) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(&public_key.to_bytes()) else {
        return false;
    };
    let Ok(bytes) = bs58::decode(signature).into_vec() else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&bytes)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sign_and_verify() {
        let signer = Ed25519Signer::random();
        let signature = signer.sign(b"payload").unwrap();
        assert!(verify_signature(&signer.public_key(), b"payload", &signature));
        assert!(!verify_signature(&signer.public_key(), b"other", &signature));
        assert!(!verify_signature(&signer.public_key(), b"payload", "garbage"));
    }

    #[test]
    fn test_zero_key_rejected() {
        assert!(Ed25519Signer::from_secret_bytes([0u8; 32]).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let signer = Ed25519Signer::from_secret_bytes([9u8; 32]).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&vec![9u8; 32]).unwrap().as_bytes())
            .unwrap();

        let loaded = Ed25519Signer::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded.public_key(), signer.public_key());
    }

    #[test]
    fn test_keypair_file_with_mismatched_public_half() {
        let mut bytes = vec![9u8; 32];
        bytes.extend_from_slice(&[1u8; 32]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        assert!(Ed25519Signer::from_file(file.path().to_str().unwrap()).is_err());
    }
}
