//! Best-effort forwarding of audit events to an external collector.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use sha2::Sha256;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::event::AuditEvent;

/// Header carrying `sha256=<base64(HMAC-SHA256(secret, body))>`.
pub const SIGNATURE_HEADER: &str = "X-Audit-Signature";

/// POSTs each event as JSON to a webhook URL from a detached task.
#[derive(Clone, Debug)]
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookForwarder {
    /// Build a forwarder whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (TLS backend
    /// initialisation).
    pub fn new(
        url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("field-vault/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            secret,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn delivery of `event` and return immediately.
    ///
    /// Failures are logged locally and go no further. Returns `None` without
    /// sending when called outside a Tokio runtime or when the event cannot be
    /// serialised.
    pub fn forward(&self, event: &AuditEvent) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    event = event.event_name.as_str(),
                    "no async runtime; audit event not forwarded"
                );
                return None;
            }
        };

        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to serialise audit event for forwarding");
                return None;
            }
        };

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(signature) = self.secret.as_deref().and_then(|s| sign(s.as_bytes(), &body)) {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let request = request.body(body);

        let url = self.url.clone();
        let name = event.event_name;
        Some(runtime.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(resp) => debug!(
                    url = %url,
                    event = name.as_str(),
                    status = resp.status().as_u16(),
                    "audit event forwarded"
                ),
                Err(e) => warn!(
                    url = %url,
                    event = name.as_str(),
                    error = %e,
                    "audit event forwarding failed"
                ),
            }
        }))
    }
}

/// `sha256=<base64>` HMAC signature over `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!(
        "sha256={}",
        STANDARD.encode(mac.finalize().into_bytes())
    ))
}
