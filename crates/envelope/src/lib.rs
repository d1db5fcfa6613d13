//! Envelope encryption for sensitive record fields.
//!
//! Every payload is sealed with AES-256-GCM under a fresh data key issued by
//! a remote key service. Only the wrapped form of that key is stored next to
//! the ciphertext; the plaintext key lives on the call stack of a single
//! encrypt or decrypt call and is zeroed before the call returns.
//!
//! # Layers
//!
//! ```text
//! FieldEncryptor ──► EnvelopeCipher ──► KmsClient ──► dyn KeyService (AWS KMS | local)
//!        │                 │                │
//!        └─────────────────┴────────────────┴──► AuditLogger ──► sinks + webhook
//! ```
//!
//! [`rotation`] is independent of the rest: a pure key-age policy.

pub mod audit;
pub mod crypto;
pub mod error;
pub mod fields;
pub mod kms;
pub mod rotation;

pub use audit::{AuditEvent, AuditEventName, AuditLogger};
pub use crypto::{EncryptedEnvelope, EnvelopeCipher};
pub use error::{CryptoError, EnvelopeError, FieldError};
pub use fields::{FieldEncryptor, Record};
pub use kms::{KeyService, KmsClient};
pub use rotation::RotationPolicy;
