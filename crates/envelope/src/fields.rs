//! Field-level encryption of structured records.
//!
//! A targeted field's value is replaced by the wire form of an
//! [`EncryptedEnvelope`](crate::EncryptedEnvelope) and a sibling
//! `<field>_encrypted: true` marker is set. Decryption acts only on fields
//! whose marker is `true`, so mixed records (legacy plaintext next to
//! encrypted fields) pass through unharmed.
//!
//! Scalars are encrypted as their JSON encoding so that numbers and booleans
//! come back with their original type.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::EnvelopeCipher;
use crate::error::FieldError;

/// A structured record: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

pub const ENCRYPTED_MARKER_SUFFIX: &str = "_encrypted";

/// `ssn` -> `ssn_encrypted`.
pub fn marker_name(field: &str) -> String {
    format!("{field}{ENCRYPTED_MARKER_SUFFIX}")
}

/// Applies an [`EnvelopeCipher`] to a named subset of a record's fields.
#[derive(Clone, Debug)]
pub struct FieldEncryptor {
    cipher: EnvelopeCipher,
}

impl FieldEncryptor {
    pub fn new(cipher: EnvelopeCipher) -> Self {
        Self { cipher }
    }

    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    /// Encrypt `fields` of `record`, returning the transformed copy.
    ///
    /// Null or absent fields are left alone and get no marker. A field whose
    /// marker is already `true` is not encrypted twice.
    ///
    /// # Errors
    ///
    /// The first failing field aborts the call; `record` is never modified.
    #[instrument(skip_all, name = "fields.encrypt", fields(field_count = fields.len()))]
    pub async fn encrypt_fields<S: AsRef<str>>(
        &self,
        record: &Record,
        fields: &[S],
    ) -> Result<Record, FieldError> {
        let mut out = record.clone();
        let mut seen = HashSet::new();

        for name in fields.iter().map(AsRef::as_ref) {
            if !seen.insert(name) {
                continue;
            }
            let marker = marker_name(name);
            if is_marked(&out, &marker) {
                debug!(field = name, "already encrypted, skipping");
                continue;
            }
            let plaintext = match out.get(name) {
                None | Some(Value::Null) => continue,
                Some(Value::Array(_) | Value::Object(_)) => {
                    return Err(FieldError::UnsupportedValue { field: name.into() })
                }
                Some(scalar) => Zeroizing::new(scalar.to_string().into_bytes()),
            };

            let wire = self
                .cipher
                .encrypt_to_wire(&plaintext)
                .await
                .map_err(|source| FieldError::Envelope {
                    field: name.into(),
                    source,
                })?;

            out.insert(name.to_owned(), Value::String(wire));
            out.insert(marker, Value::Bool(true));
        }
        Ok(out)
    }

    /// Decrypt `fields` of `record` that carry a `true` marker.
    ///
    /// The marker is removed from each decrypted field. Calling this on a
    /// record with no markers is a no-op.
    ///
    /// # Errors
    ///
    /// A marked field that does not hold a valid envelope string, or whose
    /// envelope fails to decrypt, aborts the call; `record` is never modified.
    #[instrument(skip_all, name = "fields.decrypt", fields(field_count = fields.len()))]
    pub async fn decrypt_fields<S: AsRef<str>>(
        &self,
        record: &Record,
        fields: &[S],
    ) -> Result<Record, FieldError> {
        let mut out = record.clone();
        let mut seen = HashSet::new();

        for name in fields.iter().map(AsRef::as_ref) {
            if !seen.insert(name) {
                continue;
            }
            let marker = marker_name(name);
            if !is_marked(&out, &marker) {
                continue;
            }
            let wire = match out.get(name) {
                Some(Value::String(s)) => s,
                Some(other) => {
                    return Err(FieldError::MalformedEnvelope {
                        field: name.into(),
                        reason: format!("holds a {} instead of a string", json_type(other)),
                    })
                }
                None => {
                    return Err(FieldError::MalformedEnvelope {
                        field: name.into(),
                        reason: "the value is missing".into(),
                    })
                }
            };

            let plaintext = Zeroizing::new(self.cipher.decrypt_wire(wire).await.map_err(
                |source| FieldError::Envelope {
                    field: name.into(),
                    source,
                },
            )?);
            let value = decode_scalar(&plaintext)
                .ok_or_else(|| FieldError::InvalidPlaintext { field: name.into() })?;

            out.insert(name.to_owned(), value);
            out.remove(&marker);
        }
        Ok(out)
    }
}

fn is_marked(record: &Record, marker: &str) -> bool {
    matches!(record.get(marker), Some(Value::Bool(true)))
}

/// JSON scalar if the text is exactly its encoding, otherwise the text
/// itself as a string.
///
/// Text that parses but does not re-encode to the same bytes (long digit
/// runs, `1e3`, padded whitespace) came from a raw-string producer.
fn decode_scalar(plaintext: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(plaintext).ok()?;
    match serde_json::from_str::<Value>(text) {
        Ok(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) if v.to_string() == text => {
            Some(v)
        }
        _ => Some(Value::String(text.to_owned())),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::audit::{AuditEventName, AuditLogger, MemorySink};
    use crate::error::CryptoError;
    use crate::kms::{KeyServiceError, KmsClient, LocalKeyService, MockKeyService};

    fn encryptor_with(service: Arc<dyn crate::KeyService>) -> (FieldEncryptor, MemorySink) {
        let sink = MemorySink::new();
        let audit = AuditLogger::new().with_sink(Arc::new(sink.clone()));
        let cipher = EnvelopeCipher::new(KmsClient::new(service, audit));
        (FieldEncryptor::new(cipher), sink)
    }

    fn local() -> FieldEncryptor {
        encryptor_with(Arc::new(LocalKeyService::new())).0
    }

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn round_trip_restores_fields_and_drops_markers() {
        let enc = local();
        let original = record(json!({
            "name": "Avery",
            "ssn": "123-45-6789",
            "acct": "0042-7781",
            "note": "unchanged"
        }));

        let stored = enc.encrypt_fields(&original, &["ssn", "acct"]).await.unwrap();
        assert_eq!(stored["ssn_encrypted"], true);
        assert_eq!(stored["acct_encrypted"], true);
        assert_ne!(stored["ssn"], original["ssn"]);
        assert!(!stored["ssn"].as_str().unwrap().contains("6789"));
        assert_eq!(stored["name"], "Avery");
        assert_eq!(stored["note"], "unchanged");

        let restored = enc.decrypt_fields(&stored, &["ssn", "acct"]).await.unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn null_and_absent_fields_pass_through() {
        let enc = local();
        let original = record(json!({ "dob": null, "name": "Avery" }));
        let stored = enc
            .encrypt_fields(&original, &["dob", "missing"])
            .await
            .unwrap();
        assert_eq!(stored, original);
        assert!(!stored.contains_key("dob_encrypted"));
        assert!(!stored.contains_key("missing_encrypted"));
    }

    #[tokio::test]
    async fn unmarked_fields_are_left_as_legacy_plaintext() {
        let enc = local();
        let legacy = record(json!({ "ssn": "123-45-6789", "ssn_encrypted": false }));
        let out = enc.decrypt_fields(&legacy, &["ssn"]).await.unwrap();
        assert_eq!(out, legacy);
    }

    #[tokio::test]
    async fn decrypting_twice_is_a_no_op() {
        let enc = local();
        let original = record(json!({ "ssn": "123-45-6789" }));
        let stored = enc.encrypt_fields(&original, &["ssn"]).await.unwrap();
        let once = enc.decrypt_fields(&stored, &["ssn"]).await.unwrap();
        let twice = enc.decrypt_fields(&once, &["ssn"]).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn scalar_types_survive() {
        let enc = local();
        let original = record(json!({ "balance": 1520.75, "visits": 42, "smoker": false, "zip": "02139" }));
        let fields = ["balance", "visits", "smoker", "zip"];
        let stored = enc.encrypt_fields(&original, &fields).await.unwrap();
        for f in fields {
            assert!(stored[f].is_string());
        }
        let restored = enc.decrypt_fields(&stored, &fields).await.unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn already_marked_and_duplicate_fields_encrypt_once() {
        let (enc, sink) = encryptor_with(Arc::new(LocalKeyService::new()));
        let original = record(json!({ "ssn": "123-45-6789" }));
        let stored = enc.encrypt_fields(&original, &["ssn", "ssn"]).await.unwrap();
        let again = enc.encrypt_fields(&stored, &["ssn"]).await.unwrap();
        assert_eq!(again, stored);
        let encrypts = sink
            .names()
            .into_iter()
            .filter(|n| *n == AuditEventName::DataEncrypted)
            .count();
        assert_eq!(encrypts, 1);
    }

    #[tokio::test]
    async fn arrays_and_objects_are_rejected() {
        let enc = local();
        let rec = record(json!({ "tags": ["a"], "ssn": "123" }));
        let err = enc.encrypt_fields(&rec, &["ssn", "tags"]).await.unwrap_err();
        assert!(matches!(err, FieldError::UnsupportedValue { ref field } if field == "tags"));
    }

    #[tokio::test]
    async fn failure_on_any_field_fails_the_call() {
        let mut mock = MockKeyService::new();
        let mut calls = 0;
        mock.expect_generate_data_key().returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(crate::kms::DataKeyPair {
                    plaintext: crate::kms::DataKey::generate(),
                    wrapped: vec![7; 16],
                    master_key_id: "alias/pii".into(),
                })
            } else {
                Err(KeyServiceError::Unavailable("connection reset".into()))
            }
        });
        let (enc, _) = encryptor_with(Arc::new(mock));
        let original = record(json!({ "a": "one", "b": "two" }));

        let err = enc.encrypt_fields(&original, &["a", "b"]).await.unwrap_err();
        assert_eq!(err.field(), "b");
        assert!(matches!(err.crypto_kind(), Some(CryptoError::KeyServiceUnavailable(_))));
        assert_eq!(original["a"], "one");
    }

    #[tokio::test]
    async fn marked_field_without_envelope_is_an_error() {
        let enc = local();
        let rec = record(json!({ "ssn": 12345, "ssn_encrypted": true }));
        let err = enc.decrypt_fields(&rec, &["ssn"]).await.unwrap_err();
        assert!(matches!(err, FieldError::MalformedEnvelope { .. }));

        let rec = record(json!({ "ssn": "not-base64!!", "ssn_encrypted": true }));
        let err = enc.decrypt_fields(&rec, &["ssn"]).await.unwrap_err();
        assert!(matches!(err.crypto_kind(), Some(CryptoError::MalformedEnvelope(_))));
    }

    #[tokio::test]
    async fn raw_string_plaintext_decodes_as_string() {
        let enc = local();
        let wire = enc.cipher().encrypt_to_wire(b"123-45-6789").await.unwrap();
        let rec = record(json!({ "ssn": wire, "ssn_encrypted": true }));
        let out = enc.decrypt_fields(&rec, &["ssn"]).await.unwrap();
        assert_eq!(out["ssn"], "123-45-6789");
    }

    #[tokio::test]
    async fn raw_digit_strings_keep_every_digit() {
        let enc = local();
        for raw in ["123456789012345678901234", "4111.10", " 42"] {
            let wire = enc.cipher().encrypt_to_wire(raw.as_bytes()).await.unwrap();
            let rec = record(json!({ "acct": wire, "acct_encrypted": true }));
            let out = enc.decrypt_fields(&rec, &["acct"]).await.unwrap();
            assert_eq!(out["acct"], raw, "raw plaintext {raw:?}");
        }
    }

    #[test]
    fn decode_scalar_requires_exact_encoding() {
        assert_eq!(decode_scalar(b"42"), Some(json!(42)));
        assert_eq!(decode_scalar(b"\"zip\""), Some(json!("zip")));
        assert_eq!(decode_scalar(b"1e3"), Some(json!("1e3")));
        assert_eq!(decode_scalar(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn marker_names() {
        assert_eq!(marker_name("ssn"), "ssn_encrypted");
    }
}
