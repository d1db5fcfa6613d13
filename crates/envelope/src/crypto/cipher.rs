//! [`EnvelopeCipher`]: AES-256-GCM with a fresh KMS data key per call.
//!
//! Every encrypt asks the key service for a new data key, so a (key, nonce)
//! pair can never repeat even though nonces are random. The plaintext key is
//! dropped, and therefore zeroed, before either method returns, on success
//! and failure alike.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use serde_json::json;
use tracing::instrument;

use super::envelope::{Algorithm, EncryptedEnvelope, NONCE_LEN};
use crate::audit::{details, AuditEventName, AuditLogger};
use crate::error::{CryptoError, EnvelopeError};
use crate::kms::{DataKey, DataKeyPair, KmsClient, UnwrappedKey};

/// Envelope encryption of single byte payloads.
#[derive(Clone, Debug)]
pub struct EnvelopeCipher {
    kms: KmsClient,
    audit: AuditLogger,
}

impl EnvelopeCipher {
    /// Audits through the same logger as `kms`.
    pub fn new(kms: KmsClient) -> Self {
        let audit = kms.audit().clone();
        Self { kms, audit }
    }

    pub fn kms(&self) -> &KmsClient {
        &self.kms
    }

    /// Encrypt `plaintext` under a new data key.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encryption`] wrapping the classified cause.
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedEnvelope, EnvelopeError> {
        self.encrypt_with(plaintext, Ok).await
    }

    /// Seal, then hand the envelope to `finish`. `DATA_ENCRYPTED` is recorded
    /// only after `finish` succeeds.
    #[instrument(skip_all, name = "envelope.encrypt", fields(plaintext_len = plaintext.len()))]
    async fn encrypt_with<T>(
        &self,
        plaintext: &[u8],
        finish: impl FnOnce(EncryptedEnvelope) -> Result<T, CryptoError>,
    ) -> Result<T, EnvelopeError> {
        let sealed = self.seal_with_new_key(plaintext).await.and_then(|(envelope, master_key_id)| {
            let algorithm = envelope.algorithm.clone();
            let ciphertext_len = envelope.ciphertext.len();
            finish(envelope).map(|out| (out, algorithm, ciphertext_len, master_key_id))
        });

        match sealed {
            Ok((out, algorithm, ciphertext_len, master_key_id)) => {
                self.audit.success(
                    AuditEventName::DataEncrypted,
                    details([
                        ("algorithm", json!(algorithm)),
                        ("master_key_id", json!(master_key_id)),
                        ("plaintext_len", json!(plaintext.len())),
                        ("ciphertext_len", json!(ciphertext_len)),
                    ]),
                );
                Ok(out)
            }
            Err(e) => {
                let err = EnvelopeError::Encryption(e);
                self.audit.failure(
                    AuditEventName::EncryptionFailed,
                    details([
                        ("algorithm", json!(Algorithm::Aes256Gcm.as_str())),
                        ("plaintext_len", json!(plaintext.len())),
                        ("error_kind", json!(err.kind().kind_name())),
                    ]),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Decrypt an envelope produced by [`EnvelopeCipher::encrypt`].
    ///
    /// The version/algorithm gate runs before the key service is contacted.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decryption`]; a tag mismatch or a wrapped key
    /// the service rejects is [`CryptoError::AuthenticationFailed`].
    #[instrument(skip_all, name = "envelope.decrypt", fields(ciphertext_len = envelope.ciphertext.len()))]
    pub async fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>, EnvelopeError> {
        match self.open_with_unwrapped_key(envelope).await {
            Ok((plaintext, master_key_id)) => {
                self.audit.success(
                    AuditEventName::DataDecrypted,
                    details([
                        ("algorithm", json!(envelope.algorithm)),
                        ("master_key_id", json!(master_key_id)),
                        ("ciphertext_len", json!(envelope.ciphertext.len())),
                        ("plaintext_len", json!(plaintext.len())),
                    ]),
                );
                Ok(plaintext)
            }
            Err(e) => Err(self.decryption_failed(e, Some(envelope))),
        }
    }

    /// [`EnvelopeCipher::encrypt`] followed by [`EncryptedEnvelope::to_wire_string`].
    ///
    /// # Errors
    ///
    /// As [`EnvelopeCipher::encrypt`]; an encoding failure is audited as
    /// `ENCRYPTION_FAILED`.
    pub async fn encrypt_to_wire(&self, plaintext: &[u8]) -> Result<String, EnvelopeError> {
        self.encrypt_with(plaintext, |envelope| envelope.to_wire_string())
            .await
    }

    /// Parse a stored envelope string and decrypt it.
    ///
    /// A string that does not parse is audited as `DECRYPTION_FAILED`.
    ///
    /// # Errors
    ///
    /// As [`EnvelopeCipher::decrypt`], plus [`CryptoError::MalformedEnvelope`].
    pub async fn decrypt_wire(&self, wire: &str) -> Result<Vec<u8>, EnvelopeError> {
        let envelope = EncryptedEnvelope::from_wire_str(wire)
            .map_err(|e| self.decryption_failed(e, None))?;
        self.decrypt(&envelope).await
    }

    async fn seal_with_new_key(
        &self,
        plaintext: &[u8],
    ) -> Result<(EncryptedEnvelope, String), CryptoError> {
        let DataKeyPair {
            plaintext: key,
            wrapped,
            master_key_id,
        } = self.kms.generate_data_key().await?;

        let nonce = fresh_nonce();
        let sealed = seal(&key, &nonce, plaintext);
        drop(key);

        Ok((EncryptedEnvelope::new(wrapped, nonce, sealed?), master_key_id))
    }

    async fn open_with_unwrapped_key(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> Result<(Vec<u8>, Option<String>), CryptoError> {
        envelope.validate_format()?;

        let UnwrappedKey {
            plaintext: key,
            master_key_id,
        } = self.kms.unwrap_data_key(&envelope.wrapped_data_key).await?;

        let opened = open(&key, &envelope.nonce, &envelope.ciphertext);
        drop(key);

        Ok((opened?, master_key_id))
    }

    fn decryption_failed(
        &self,
        cause: CryptoError,
        envelope: Option<&EncryptedEnvelope>,
    ) -> EnvelopeError {
        let err = EnvelopeError::Decryption(cause);
        let mut fields = details([("error_kind", json!(err.kind().kind_name()))]);
        if let Some(env) = envelope {
            fields.insert("algorithm".into(), json!(env.algorithm));
            fields.insert("version".into(), json!(env.version));
            fields.insert("ciphertext_len".into(), json!(env.ciphertext.len()));
        }
        self.audit
            .failure(AuditEventName::DecryptionFailed, fields, &err);
        err
    }
}

fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn seal(key: &DataKey, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::Cipher("AES-256-GCM seal failed".into()))
}

fn open(key: &DataKey, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
