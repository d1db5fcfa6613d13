//! AES-256-GCM envelope encryption of byte payloads.
//!
//! # Stored form
//!
//! ```text
//! base64( {"encryptedKey":[..],"iv":[..12..],"ciphertext":[..],"algorithm":"AES-256-GCM","version":"1.0"} )
//! ```
//!
//! `ciphertext` carries the 16-byte GCM tag appended. The `version` and
//! `algorithm` pair is checked before any key service call is made.

pub mod cipher;
pub mod envelope;

pub use cipher::EnvelopeCipher;
pub use envelope::{Algorithm, EncryptedEnvelope, ENVELOPE_VERSION, NONCE_LEN};
