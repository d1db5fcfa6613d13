//! Error types for the envelope encryption layers.

use thiserror::Error;

/// The classified reason a cryptographic operation failed.
///
/// Nothing in here carries plaintext or key bytes; messages are safe to audit.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key service could not be reached, answered with a transport-level
    /// error, or did not answer within the request timeout.
    #[error("key service unavailable: {0}")]
    KeyServiceUnavailable(String),

    /// The key service answered a generate request without usable key material.
    #[error("data key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// The key service answered an unwrap request without usable key material.
    #[error("data key unwrap failed: {0}")]
    KeyUnwrapFailed(String),

    /// The envelope's version/algorithm pair is not the one this build supports.
    #[error("unsupported envelope format: version {version:?}, algorithm {algorithm:?}")]
    UnsupportedEnvelopeFormat { version: String, algorithm: String },

    /// GCM tag verification failed, or the key service refused the wrapped key.
    #[error("authentication failed: envelope was tampered with or corrupted")]
    AuthenticationFailed,

    /// The serialized envelope could not be parsed.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Local AEAD failure while sealing.
    #[error("cipher failure: {0}")]
    Cipher(String),
}

impl CryptoError {
    /// Stable snake_case identifier used in audit details.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CryptoError::KeyServiceUnavailable(_) => "key_service_unavailable",
            CryptoError::KeyGenerationFailed(_) => "key_generation_failed",
            CryptoError::KeyUnwrapFailed(_) => "key_unwrap_failed",
            CryptoError::UnsupportedEnvelopeFormat { .. } => "unsupported_envelope_format",
            CryptoError::AuthenticationFailed => "authentication_failed",
            CryptoError::MalformedEnvelope(_) => "malformed_envelope",
            CryptoError::Cipher(_) => "cipher_failure",
        }
    }

    /// Only transient key service failures are worth a caller-side retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CryptoError::KeyServiceUnavailable(_))
    }
}

/// Error returned by [`crate::EnvelopeCipher`].
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("encryption failed: {0}")]
    Encryption(#[source] CryptoError),

    #[error("decryption failed: {0}")]
    Decryption(#[source] CryptoError),
}

impl EnvelopeError {
    /// The underlying classified failure.
    pub fn kind(&self) -> &CryptoError {
        match self {
            EnvelopeError::Encryption(e) | EnvelopeError::Decryption(e) => e,
        }
    }
}

/// Error returned by [`crate::FieldEncryptor`].
///
/// Any error aborts the whole call; no partially transformed record escapes.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field `{field}`: {source}")]
    Envelope {
        field: String,
        #[source]
        source: EnvelopeError,
    },

    /// The targeted field holds an array or object.
    #[error("field `{field}` must hold a string, number or boolean")]
    UnsupportedValue { field: String },

    /// The field is marked encrypted but does not hold an envelope string.
    #[error("field `{field}` is marked encrypted but {reason}")]
    MalformedEnvelope { field: String, reason: String },

    /// The decrypted bytes are not UTF-8 text.
    #[error("field `{field}` decrypted to non UTF-8 bytes")]
    InvalidPlaintext { field: String },
}

impl FieldError {
    /// Name of the field that caused the failure.
    pub fn field(&self) -> &str {
        match self {
            FieldError::Envelope { field, .. }
            | FieldError::UnsupportedValue { field }
            | FieldError::MalformedEnvelope { field, .. }
            | FieldError::InvalidPlaintext { field } => field,
        }
    }

    /// The crypto-layer cause, when there is one.
    pub fn crypto_kind(&self) -> Option<&CryptoError> {
        match self {
            FieldError::Envelope { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
