//! KMS client adapter: the remote generate/unwrap contract, its backends, and
//! the audited process-wide handle.
//!
//! # Key material invariants
//!
//! - A [`DataKey`] is zeroed when dropped and is neither `Clone` nor printable.
//! - No layer caches plaintext keys across calls; every encrypt generates a
//!   new key and every decrypt unwraps one afresh.

pub mod aws;
pub mod client;
pub mod local;

pub use aws::{AwsKeyService, KmsSettings, StaticCredentials};
pub use client::KmsClient;
pub use local::LocalKeyService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use zeroize::Zeroizing;

/// Byte length of a data key (AES-256).
pub const DATA_KEY_LEN: usize = 32;

/// Key spec requested from the key service.
pub const KEY_SPEC: &str = "AES_256";

/// Plaintext data key. Overwritten with zeroes on drop.
pub struct DataKey(Zeroizing<[u8; DATA_KEY_LEN]>);

impl DataKey {
    /// Copy key material out of `bytes`, which must be exactly [`DATA_KEY_LEN`] long.
    ///
    /// # Errors
    ///
    /// Returns [`KeyServiceError::MalformedResponse`] for any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyServiceError> {
        if bytes.len() != DATA_KEY_LEN {
            return Err(KeyServiceError::MalformedResponse(format!(
                "data key must be {DATA_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = Zeroizing::new([0u8; DATA_KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Fill a new key from the OS CSPRNG.
    pub fn generate() -> Self {
        use aes_gcm::aead::{rand_core::RngCore, OsRng};
        let mut buf = Zeroizing::new([0u8; DATA_KEY_LEN]);
        OsRng.fill_bytes(&mut buf[..]);
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; DATA_KEY_LEN] {
        &*self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// Result of a generate call: the plaintext key plus the form to store.
#[derive(Debug)]
pub struct DataKeyPair {
    pub plaintext: DataKey,
    /// Ciphertext of the key under the master key; opaque to this crate.
    pub wrapped: Vec<u8>,
    /// Key id that wrapped the key, as reported by the service.
    pub master_key_id: String,
}

/// Result of an unwrap call.
#[derive(Debug)]
pub struct UnwrappedKey {
    pub plaintext: DataKey,
    /// Master key that served the request, when the service reports it.
    pub master_key_id: Option<String>,
}

/// Metadata of the configured master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyInfo {
    pub key_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Failures reported by a [`KeyService`] backend.
#[derive(Debug, Error)]
pub enum KeyServiceError {
    /// Transport or remote-side failure; the request may succeed later.
    #[error("key service unreachable: {0}")]
    Unavailable(String),

    /// The service answered without the fields this contract requires.
    #[error("malformed key service response: {0}")]
    MalformedResponse(String),

    /// The service refused the wrapped key as not authentic.
    #[error("key service rejected the wrapped key: {0}")]
    InvalidCiphertext(String),

    /// Backend settings are unusable (bad master key, missing key id).
    #[error("key service misconfigured: {0}")]
    Misconfigured(String),
}

/// The generate/unwrap contract of a remote key service.
///
/// Implementations perform one request per call and keep no plaintext keys
/// between calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Ask the service for a new AES-256 data key under the master key.
    async fn generate_data_key(&self) -> Result<DataKeyPair, KeyServiceError>;

    /// Ask the service to unwrap a key previously returned by
    /// [`KeyService::generate_data_key`].
    async fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<UnwrappedKey, KeyServiceError>;

    /// Describe the configured master key.
    async fn describe_master_key(&self) -> Result<MasterKeyInfo, KeyServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_key_rejects_wrong_length() {
        assert!(matches!(
            DataKey::from_slice(&[0u8; 16]),
            Err(KeyServiceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn data_key_copies_material() {
        let key = DataKey::from_slice(&[7u8; DATA_KEY_LEN]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; DATA_KEY_LEN]);
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(DataKey::generate().as_bytes(), DataKey::generate().as_bytes());
    }

    #[test]
    fn data_key_redacted_in_debug() {
        let key = DataKey::from_slice(&[0xAB; DATA_KEY_LEN]).unwrap();
        let printed = format!("{key:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("171"));
    }
}
