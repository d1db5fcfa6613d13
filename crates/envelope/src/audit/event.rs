//! [`AuditEvent`] and its closed vocabulary of operation names.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contextual metadata attached to an event.
///
/// Key ids, algorithm names, sizes. Never plaintext, never key bytes.
pub type AuditDetails = BTreeMap<String, serde_json::Value>;

/// Build [`AuditDetails`] from `(name, value)` pairs.
pub fn details<I, V>(pairs: I) -> AuditDetails
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<serde_json::Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.into()))
        .collect()
}

/// Every security-relevant operation that produces an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventName {
    DataKeyGenerated,
    DataKeyGenerationFailed,
    DataKeyDecrypted,
    DataKeyDecryptionFailed,
    DataEncrypted,
    EncryptionFailed,
    DataDecrypted,
    DecryptionFailed,
}

impl AuditEventName {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventName::DataKeyGenerated => "DATA_KEY_GENERATED",
            AuditEventName::DataKeyGenerationFailed => "DATA_KEY_GENERATION_FAILED",
            AuditEventName::DataKeyDecrypted => "DATA_KEY_DECRYPTED",
            AuditEventName::DataKeyDecryptionFailed => "DATA_KEY_DECRYPTION_FAILED",
            AuditEventName::DataEncrypted => "DATA_ENCRYPTED",
            AuditEventName::EncryptionFailed => "ENCRYPTION_FAILED",
            AuditEventName::DataDecrypted => "DATA_DECRYPTED",
            AuditEventName::DecryptionFailed => "DECRYPTION_FAILED",
        }
    }
}

impl std::fmt::Display for AuditEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `INFO` for successes, `ERROR` whenever an error is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Error,
}

/// The error attached to a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditError {
    pub message: String,
    /// Messages of the `source()` chain, outermost first, excluding `message`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
}

impl AuditError {
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            chain,
        }
    }
}

/// A single structured audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_name: AuditEventName,
    pub severity: Severity,
    pub details: AuditDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AuditError>,
}

impl AuditEvent {
    /// Stamp a new event with the current time. Severity follows `error`.
    pub fn new(
        event_name: AuditEventName,
        details: AuditDetails,
        error: Option<&(dyn StdError + 'static)>,
    ) -> Self {
        let error = error.map(AuditError::from_error);
        let severity = if error.is_some() {
            Severity::Error
        } else {
            Severity::Info
        };
        Self {
            timestamp: Utc::now(),
            event_name,
            severity,
            details,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CryptoError, EnvelopeError};
    use serde_json::json;

    #[test]
    fn names_serialize_to_taxonomy() {
        for name in [
            AuditEventName::DataKeyGenerated,
            AuditEventName::DataKeyGenerationFailed,
            AuditEventName::DataKeyDecrypted,
            AuditEventName::DataKeyDecryptionFailed,
            AuditEventName::DataEncrypted,
            AuditEventName::EncryptionFailed,
            AuditEventName::DataDecrypted,
            AuditEventName::DecryptionFailed,
        ] {
            assert_eq!(serde_json::to_value(name).unwrap(), json!(name.as_str()));
        }
    }

    #[test]
    fn severity_follows_error() {
        let ok = AuditEvent::new(AuditEventName::DataEncrypted, AuditDetails::new(), None);
        assert_eq!(ok.severity, Severity::Info);
        assert!(ok.error.is_none());

        let err = EnvelopeError::Encryption(CryptoError::KeyServiceUnavailable("down".into()));
        let failed = AuditEvent::new(
            AuditEventName::EncryptionFailed,
            AuditDetails::new(),
            Some(&err),
        );
        assert_eq!(failed.severity, Severity::Error);
        let attached = failed.error.unwrap();
        assert!(attached.message.starts_with("encryption failed"));
        assert_eq!(attached.chain, vec!["key service unavailable: down"]);
    }

    #[test]
    fn event_json_shape() {
        let ev = AuditEvent::new(
            AuditEventName::DataKeyGenerated,
            details([("master_key_id", json!("alias/pii")), ("wrapped_key_len", json!(184))]),
            None,
        );
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["eventName"], "DATA_KEY_GENERATED");
        assert_eq!(v["severity"], "INFO");
        assert_eq!(v["details"]["master_key_id"], "alias/pii");
        assert!(v.get("error").is_none());
        assert!(v["timestamp"].is_string());
    }
}
