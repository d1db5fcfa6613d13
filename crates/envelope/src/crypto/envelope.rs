//! [`EncryptedEnvelope`]: the self-contained unit of ciphertext at rest.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// The only envelope version this build reads or writes.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Byte length of an AES-GCM nonce (96 bits).
pub const NONCE_LEN: usize = 12;

/// Symmetric algorithms an envelope may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Aes256Gcm,
}

impl Algorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "AES-256-GCM",
        }
    }

    /// Exact, case-sensitive match against known names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "AES-256-GCM" => Some(Algorithm::Aes256Gcm),
            _ => None,
        }
    }
}

/// Ciphertext plus everything needed to decrypt it, except KMS access.
///
/// Holds no plaintext key material. Version and algorithm are kept as plain
/// strings so that envelopes from other versions still parse and can be
/// rejected explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Data key wrapped under the KMS master key.
    #[serde(rename = "encryptedKey")]
    pub wrapped_data_key: Vec<u8>,
    #[serde(rename = "iv")]
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the GCM tag appended.
    pub ciphertext: Vec<u8>,
    pub algorithm: String,
    pub version: String,
}

impl EncryptedEnvelope {
    /// Assemble a current-version AES-256-GCM envelope.
    pub fn new(wrapped_data_key: Vec<u8>, nonce: [u8; NONCE_LEN], ciphertext: Vec<u8>) -> Self {
        Self {
            wrapped_data_key,
            nonce,
            ciphertext,
            algorithm: Algorithm::Aes256Gcm.as_str().to_owned(),
            version: ENVELOPE_VERSION.to_owned(),
        }
    }

    /// Check the version/algorithm pair against what this build supports.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedEnvelopeFormat`] on any mismatch.
    pub fn validate_format(&self) -> Result<Algorithm, CryptoError> {
        match Algorithm::parse(&self.algorithm) {
            Some(alg) if self.version == ENVELOPE_VERSION => Ok(alg),
            _ => Err(CryptoError::UnsupportedEnvelopeFormat {
                version: self.version.clone(),
                algorithm: self.algorithm.clone(),
            }),
        }
    }

    /// Encode to the transportable string form stored by callers.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedEnvelope`] if JSON encoding fails.
    pub fn to_wire_string(&self) -> Result<String, CryptoError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("cannot encode envelope: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    /// Parse the string form produced by [`EncryptedEnvelope::to_wire_string`].
    ///
    /// Does not validate version or algorithm; see
    /// [`EncryptedEnvelope::validate_format`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedEnvelope`] if the input is not base64,
    /// not the expected JSON structure, or carries an IV of the wrong length.
    pub fn from_wire_str(s: &str) -> Result<Self, CryptoError> {
        let json = STANDARD
            .decode(s.trim())
            .map_err(|_| CryptoError::MalformedEnvelope("not valid base64".into()))?;
        serde_json::from_slice(&json)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("not an envelope: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EncryptedEnvelope {
        EncryptedEnvelope::new(vec![1, 2, 3], [7u8; NONCE_LEN], vec![9, 9, 9, 9])
    }

    #[test]
    fn new_sets_current_format() {
        let env = sample();
        assert_eq!(env.version, "1.0");
        assert_eq!(env.algorithm, "AES-256-GCM");
        assert_eq!(env.validate_format().unwrap(), Algorithm::Aes256Gcm);
    }

    #[test]
    fn json_uses_wire_field_names_and_integer_arrays() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["encryptedKey"], json!([1, 2, 3]));
        assert_eq!(v["iv"].as_array().unwrap().len(), NONCE_LEN);
        assert_eq!(v["ciphertext"], json!([9, 9, 9, 9]));
        assert_eq!(v["algorithm"], "AES-256-GCM");
        assert_eq!(v["version"], "1.0");
    }

    #[test]
    fn wire_string_parses_back() {
        let env = sample();
        let wire = env.to_wire_string().unwrap();
        assert_eq!(EncryptedEnvelope::from_wire_str(&wire).unwrap(), env);
    }

    #[test]
    fn validate_rejects_other_version() {
        let mut env = sample();
        env.version = "2.0".into();
        assert!(matches!(
            env.validate_format(),
            Err(CryptoError::UnsupportedEnvelopeFormat { ref version, .. }) if version == "2.0"
        ));
    }

    #[test]
    fn validate_rejects_other_algorithm() {
        let mut env = sample();
        env.algorithm = "aes-256-gcm".into();
        assert!(env.validate_format().is_err());
        env.algorithm = "AES-128-GCM".into();
        assert!(env.validate_format().is_err());
    }

    #[test]
    fn foreign_pair_still_parses() {
        let raw = json!({
            "encryptedKey": [1], "iv": [0,0,0,0,0,0,0,0,0,0,0,0], "ciphertext": [2],
            "algorithm": "CHACHA20-POLY1305", "version": "3.1"
        });
        let wire = STANDARD.encode(serde_json::to_vec(&raw).unwrap());
        let env = EncryptedEnvelope::from_wire_str(&wire).unwrap();
        assert_eq!(env.algorithm, "CHACHA20-POLY1305");
        assert!(env.validate_format().is_err());
    }

    #[test]
    fn from_wire_rejects_bad_base64() {
        assert!(matches!(
            EncryptedEnvelope::from_wire_str("!!!not base64"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn from_wire_rejects_short_iv() {
        let raw = json!({
            "encryptedKey": [1], "iv": [0, 0, 0], "ciphertext": [2],
            "algorithm": "AES-256-GCM", "version": "1.0"
        });
        let wire = STANDARD.encode(serde_json::to_vec(&raw).unwrap());
        assert!(matches!(
            EncryptedEnvelope::from_wire_str(&wire),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn from_wire_rejects_missing_fields() {
        let wire = STANDARD.encode(br#"{"ciphertext":[1]}"#);
        assert!(EncryptedEnvelope::from_wire_str(&wire).is_err());
    }
}
