//! Request and response types exchanged over the JSON HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A flat record: field name to scalar JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Field encryption endpoints
// ---------------------------------------------------------------------------

/// Request body for `POST /fields/encrypt` and `POST /fields/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsRequest {
    /// The record whose named fields are transformed.
    pub record: Record,
    /// Names of the fields to encrypt or decrypt.
    pub fields: Vec<String>,
}

/// Successful response body for both field endpoints.
///
/// After encryption each processed field holds a serialized envelope and a
/// sibling `<field>_encrypted: true` marker. After decryption the markers are
/// removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsResponse {
    pub record: Record,
}

// ---------------------------------------------------------------------------
// Rotation endpoints
// ---------------------------------------------------------------------------

/// Request body for `POST /rotation/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationCheckRequest {
    /// When the key under consideration was created.
    pub created_at: DateTime<Utc>,
}

/// Policy verdict for a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationCheckResponse {
    /// Whole days elapsed since creation (truncated).
    pub age_days: i64,
    pub threshold_days: u32,
    pub due: bool,
}

/// Response body for `GET /rotation/master-key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterKeyRotationResponse {
    pub key_id: String,
    /// Absent when the key service does not report a creation date.
    pub created_at: Option<DateTime<Utc>>,
    pub age_days: Option<i64>,
    pub threshold_days: u32,
    pub due: bool,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Response body for `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether the key service adapter has everything it needs (key id,
    /// region, credentials).
    pub kms_configured: bool,
    /// Backend in use: `"aws"` or `"local"`.
    pub key_service: String,
    pub master_key_id: String,
    pub region: Option<String>,
    pub rotation_threshold_days: u32,
    /// Whether audit events are forwarded to an external collector.
    pub audit_forwarding: bool,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"invalid_input"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
    /// Whether retrying the same request later may succeed.
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self {
            code: err.code().into(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
