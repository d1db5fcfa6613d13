//! Service-level error type returned by the HTTP surface.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::InvalidInput`] → 400
/// - [`ServiceError::CryptoFailure`] → 500
/// - [`ServiceError::KeyServiceUnavailable`] → 503
/// - [`ServiceError::Internal`] → 500
///
/// Messages must be safe to show to callers: never plaintext, never key bytes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request or a stored envelope inside it cannot be processed as given.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A cryptographic operation failed (authentication, key generation, unwrap).
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// The remote key service could not be reached or timed out.
    ///
    /// Callers may retry with backoff; the service never retries internally.
    #[error("key service unavailable: {0}")]
    KeyServiceUnavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::InvalidInput(_) => 400,
            ServiceError::CryptoFailure(_) => 500,
            ServiceError::KeyServiceUnavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::CryptoFailure(_) => "crypto_failure",
            ServiceError::KeyServiceUnavailable(_) => "key_service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Retryable errors are transient remote failures only.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::KeyServiceUnavailable(_))
    }
}
