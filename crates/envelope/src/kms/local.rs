//! In-process key service for development and tests.
//!
//! Data keys are wrapped with AES-256-GCM under a local master key:
//!
//! ```text
//! wrapped = nonce (12 bytes) || AES-256-GCM(master, nonce, data_key) (32 + 16 bytes)
//! ```
//!
//! The master key lives only in process memory. Anything wrapped by one
//! instance can be unwrapped only by an instance holding the same master key.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{
    DataKey, DataKeyPair, KeyService, KeyServiceError, MasterKeyInfo, UnwrappedKey, DATA_KEY_LEN,
};

const WRAP_NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// [`KeyService`] that never leaves the process.
pub struct LocalKeyService {
    key_id: String,
    cipher: Aes256Gcm,
    created_at: DateTime<Utc>,
}

impl LocalKeyService {
    /// Create a service with a random master key and a `local/<uuid>` key id.
    pub fn new() -> Self {
        let master = DataKey::generate();
        Self {
            key_id: format!("local/{}", Uuid::new_v4()),
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master.as_bytes())),
            created_at: Utc::now(),
        }
    }

    /// Create a service from existing master key material.
    ///
    /// # Errors
    ///
    /// Returns [`KeyServiceError::Misconfigured`] if `master_key` is not 32 bytes.
    pub fn with_master_key(
        key_id: impl Into<String>,
        master_key: &[u8],
    ) -> Result<Self, KeyServiceError> {
        let cipher = Aes256Gcm::new_from_slice(master_key).map_err(|_| {
            KeyServiceError::Misconfigured(format!(
                "local master key must be {DATA_KEY_LEN} bytes, got {}",
                master_key.len()
            ))
        })?;
        Ok(Self {
            key_id: key_id.into(),
            cipher,
            created_at: Utc::now(),
        })
    }

    /// Report a different master key creation time from [`KeyService::describe_master_key`].
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl Default for LocalKeyService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyService for LocalKeyService {
    async fn generate_data_key(&self) -> Result<DataKeyPair, KeyServiceError> {
        let plaintext = DataKey::generate();

        let mut nonce = [0u8; WRAP_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes().as_slice())
            .map_err(|_| KeyServiceError::Misconfigured("local key wrap failed".into()))?;

        let mut wrapped = Vec::with_capacity(WRAP_NONCE_LEN + sealed.len());
        wrapped.extend_from_slice(&nonce);
        wrapped.extend_from_slice(&sealed);

        Ok(DataKeyPair {
            plaintext,
            wrapped,
            master_key_id: self.key_id.clone(),
        })
    }

    async fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<UnwrappedKey, KeyServiceError> {
        if wrapped.len() != WRAP_NONCE_LEN + DATA_KEY_LEN + TAG_LEN {
            return Err(KeyServiceError::InvalidCiphertext(format!(
                "wrapped key has length {}",
                wrapped.len()
            )));
        }
        let (nonce, sealed) = wrapped.split_at(WRAP_NONCE_LEN);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|_| {
                    KeyServiceError::InvalidCiphertext("wrapped key failed authentication".into())
                })?,
        );

        Ok(UnwrappedKey {
            plaintext: DataKey::from_slice(&plaintext)?,
            master_key_id: Some(self.key_id.clone()),
        })
    }

    async fn describe_master_key(&self) -> Result<MasterKeyInfo, KeyServiceError> {
        Ok(MasterKeyInfo {
            key_id: self.key_id.clone(),
            created_at: Some(self.created_at),
        })
    }
}
