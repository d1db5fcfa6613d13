//! Configuration snapshot served by `GET /status`.

use common::protocol::StatusResponse;

use crate::config::Config;

/// Assemble the status report from validated configuration.
///
/// Secrets never appear here: only whether they are set.
pub fn snapshot(cfg: &Config, master_key_id: &str, audit_forwarding: bool) -> StatusResponse {
    let settings = cfg.kms_settings();
    StatusResponse {
        kms_configured: settings.is_configured(),
        key_service: cfg.key_service.as_str().into(),
        master_key_id: master_key_id.into(),
        region: settings.region,
        rotation_threshold_days: cfg.key_rotation_days,
        audit_forwarding,
        version: env!("CARGO_PKG_VERSION").into(),
    }
}
