//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use common::protocol::StatusResponse;
use envelope::kms::LocalKeyService;
use envelope::{AuditLogger, EnvelopeCipher, FieldEncryptor, KeyService, KmsClient, RotationPolicy};

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so that Axum can clone the state for each
/// request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// Field encryptor over the configured key service.
    pub fields: FieldEncryptor,
    /// Master key age policy.
    pub policy: RotationPolicy,
    /// Configuration snapshot reported by `GET /status`; fixed at startup.
    pub status: Arc<StatusResponse>,
}

impl AppState {
    pub fn new(fields: FieldEncryptor, policy: RotationPolicy, status: StatusResponse) -> Self {
        Self {
            fields,
            policy,
            status: Arc::new(status),
        }
    }

    /// State over an arbitrary key service with the default policy.
    pub fn with_key_service(service: Arc<dyn KeyService>, master_key_id: &str) -> Self {
        let kms = KmsClient::new(service, AuditLogger::new());
        let policy = RotationPolicy::default();
        let status = StatusResponse {
            kms_configured: false,
            key_service: "local".into(),
            master_key_id: master_key_id.into(),
            region: None,
            rotation_threshold_days: policy.threshold_days,
            audit_forwarding: false,
            version: env!("CARGO_PKG_VERSION").into(),
        };
        Self::new(FieldEncryptor::new(EnvelopeCipher::new(kms)), policy, status)
    }

    pub fn kms(&self) -> &KmsClient {
        self.fields.cipher().kms()
    }
}

impl Default for AppState {
    /// State over a throwaway [`LocalKeyService`], suitable for tests.
    fn default() -> Self {
        let local = LocalKeyService::new();
        let key_id = local.key_id().to_owned();
        Self::with_key_service(Arc::new(local), &key_id)
    }
}
