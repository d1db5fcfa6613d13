//! [`KmsClient`]: the audited, time-bounded handle every cipher call goes through.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, instrument};

use super::{DataKeyPair, KeyService, KeyServiceError, MasterKeyInfo, UnwrappedKey, KEY_SPEC};
use crate::audit::{details, AuditEventName, AuditLogger};
use crate::error::CryptoError;

/// Default upper bound on a single key service round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-wide key service handle.
///
/// Built once at startup and passed by clone to whoever needs it; clones share
/// the backend. Safe to call concurrently: the only shared resource is the
/// backend, and each call is one request/response.
#[derive(Clone)]
pub struct KmsClient {
    service: Arc<dyn KeyService>,
    audit: AuditLogger,
    timeout: Duration,
}

impl KmsClient {
    pub fn new(service: Arc<dyn KeyService>, audit: AuditLogger) -> Self {
        Self {
            service,
            audit,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request a fresh data key.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::KeyServiceUnavailable`] on transport failure or timeout.
    /// - [`CryptoError::KeyGenerationFailed`] when the response lacks key material.
    #[instrument(skip_all, name = "kms.generate_data_key")]
    pub async fn generate_data_key(&self) -> Result<DataKeyPair, CryptoError> {
        let result = match tokio::time::timeout(self.timeout, self.service.generate_data_key()).await
        {
            Ok(inner) => inner.map_err(|e| match e {
                KeyServiceError::Unavailable(m) => CryptoError::KeyServiceUnavailable(m),
                other => CryptoError::KeyGenerationFailed(other.to_string()),
            }),
            Err(_) => Err(self.timed_out("generate data key")),
        };

        match result {
            Ok(pair) => {
                debug!(wrapped_key_len = pair.wrapped.len(), "data key issued");
                self.audit.success(
                    AuditEventName::DataKeyGenerated,
                    details([
                        ("master_key_id", json!(pair.master_key_id)),
                        ("key_spec", json!(KEY_SPEC)),
                        ("wrapped_key_len", json!(pair.wrapped.len())),
                    ]),
                );
                Ok(pair)
            }
            Err(e) => {
                self.audit.failure(
                    AuditEventName::DataKeyGenerationFailed,
                    details([
                        ("key_spec", json!(KEY_SPEC)),
                        ("error_kind", json!(e.kind_name())),
                    ]),
                    &e,
                );
                Err(e)
            }
        }
    }

    /// Unwrap a stored data key.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::KeyServiceUnavailable`] on transport failure or timeout.
    /// - [`CryptoError::AuthenticationFailed`] when the service rejects the blob.
    /// - [`CryptoError::KeyUnwrapFailed`] when the response lacks key material.
    #[instrument(skip_all, name = "kms.unwrap_data_key", fields(wrapped_key_len = wrapped.len()))]
    pub async fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<UnwrappedKey, CryptoError> {
        let result =
            match tokio::time::timeout(self.timeout, self.service.unwrap_data_key(wrapped)).await {
                Ok(inner) => inner.map_err(|e| match e {
                    KeyServiceError::Unavailable(m) => CryptoError::KeyServiceUnavailable(m),
                    KeyServiceError::InvalidCiphertext(_) => CryptoError::AuthenticationFailed,
                    other => CryptoError::KeyUnwrapFailed(other.to_string()),
                }),
                Err(_) => Err(self.timed_out("unwrap data key")),
            };

        match result {
            Ok(key) => {
                self.audit.success(
                    AuditEventName::DataKeyDecrypted,
                    details([
                        ("master_key_id", json!(key.master_key_id)),
                        ("wrapped_key_len", json!(wrapped.len())),
                    ]),
                );
                Ok(key)
            }
            Err(e) => {
                self.audit.failure(
                    AuditEventName::DataKeyDecryptionFailed,
                    details([
                        ("wrapped_key_len", json!(wrapped.len())),
                        ("error_kind", json!(e.kind_name())),
                    ]),
                    &e,
                );
                Err(e)
            }
        }
    }

    /// Describe the master key. Not audited: no key material is involved.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyServiceUnavailable`] for any failure.
    pub async fn describe_master_key(&self) -> Result<MasterKeyInfo, CryptoError> {
        match tokio::time::timeout(self.timeout, self.service.describe_master_key()).await {
            Ok(inner) => inner.map_err(|e| CryptoError::KeyServiceUnavailable(e.to_string())),
            Err(_) => Err(self.timed_out("describe master key")),
        }
    }

    fn timed_out(&self, op: &str) -> CryptoError {
        CryptoError::KeyServiceUnavailable(format!(
            "{op} timed out after {}ms",
            self.timeout.as_millis()
        ))
    }
}

impl std::fmt::Debug for KmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
