//! Mapping of library errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use envelope::{CryptoError, FieldError};
use tracing::warn;

/// A [`ServiceError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

impl From<FieldError> for ApiError {
    fn from(err: FieldError) -> Self {
        let field = err.field().to_owned();
        let kind = err.crypto_kind().map_or("field", CryptoError::kind_name);
        warn!(field = %field, error_kind = kind, error = %err, "field operation failed");

        let mapped = match &err {
            FieldError::UnsupportedValue { .. } | FieldError::MalformedEnvelope { .. } => {
                ServiceError::InvalidInput(err.to_string())
            }
            FieldError::InvalidPlaintext { .. } => {
                ServiceError::CryptoFailure(format!("field `{field}` could not be decrypted"))
            }
            FieldError::Envelope { source, .. } => match source.kind() {
                CryptoError::KeyServiceUnavailable(_) => {
                    ServiceError::KeyServiceUnavailable("key service unavailable".into())
                }
                CryptoError::UnsupportedEnvelopeFormat { .. } | CryptoError::MalformedEnvelope(_) => {
                    ServiceError::InvalidInput(err.to_string())
                }
                CryptoError::AuthenticationFailed
                | CryptoError::KeyGenerationFailed(_)
                | CryptoError::KeyUnwrapFailed(_)
                | CryptoError::Cipher(_) => {
                    ServiceError::CryptoFailure(format!("field `{field}`: {}", generic(source.kind())))
                }
            },
        };
        ApiError(mapped)
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        warn!(error_kind = err.kind_name(), error = %err, "key service call failed");
        ApiError(match err {
            CryptoError::KeyServiceUnavailable(_) => {
                ServiceError::KeyServiceUnavailable("key service unavailable".into())
            }
            other => ServiceError::Internal(generic(&other).into()),
        })
    }
}

fn generic(kind: &CryptoError) -> &'static str {
    match kind {
        CryptoError::AuthenticationFailed => "envelope failed authentication",
        CryptoError::KeyGenerationFailed(_) => "data key generation failed",
        CryptoError::KeyUnwrapFailed(_) => "data key unwrap failed",
        _ => "cryptographic operation failed",
    }
}
