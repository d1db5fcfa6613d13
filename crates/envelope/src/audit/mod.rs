//! Audit trail of every cryptographic operation.
//!
//! [`AuditLogger::log`] writes to each configured [`AuditSink`] synchronously
//! and, when a [`WebhookForwarder`] is configured, hands the event to a
//! detached delivery task. Forwarding can never fail or delay the operation
//! being audited.
//!
//! # Invariants
//!
//! - Details carry metadata only: key ids, algorithm, sizes, error kinds.
//! - Plaintext and key bytes never reach an event.

pub mod event;
pub mod forward;
pub mod sink;

pub use event::{details, AuditDetails, AuditError, AuditEvent, AuditEventName, Severity};
pub use forward::WebhookForwarder;
pub use sink::{AuditSink, MemorySink, TracingSink};

use std::error::Error as StdError;
use std::sync::Arc;

/// Cheaply cloneable handle shared by every layer that audits.
#[derive(Clone)]
pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
    forwarder: Option<WebhookForwarder>,
}

impl AuditLogger {
    /// A logger writing to [`TracingSink`] only.
    pub fn new() -> Self {
        Self {
            sinks: vec![Arc::new(TracingSink)],
            forwarder: None,
        }
    }

    /// Add another synchronous sink.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Forward every event to an external collector.
    pub fn with_forwarder(mut self, forwarder: WebhookForwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarder.is_some()
    }

    /// Record one event.
    pub fn log(
        &self,
        event_name: AuditEventName,
        details: AuditDetails,
        error: Option<&(dyn StdError + 'static)>,
    ) {
        let event = AuditEvent::new(event_name, details, error);
        for sink in &self.sinks {
            sink.record(&event);
        }
        if let Some(forwarder) = &self.forwarder {
            // Detached: the handle is dropped, the task keeps running.
            let _ = forwarder.forward(&event);
        }
    }

    pub fn success(&self, event_name: AuditEventName, details: AuditDetails) {
        self.log(event_name, details, None);
    }

    pub fn failure(
        &self,
        event_name: AuditEventName,
        details: AuditDetails,
        error: &(dyn StdError + 'static),
    ) {
        self.log(event_name, details, Some(error));
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("sinks", &self.sinks.len())
            .field("forwarder", &self.forwarder.as_ref().map(WebhookForwarder::url))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn log_reaches_every_sink() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        let logger = AuditLogger::new()
            .with_sink(Arc::new(a.clone()))
            .with_sink(Arc::new(b.clone()));

        logger.success(
            AuditEventName::DataKeyGenerated,
            details([("master_key_id", json!("alias/pii"))]),
        );

        assert_eq!(a.names(), vec![AuditEventName::DataKeyGenerated]);
        assert_eq!(b.events()[0].details["master_key_id"], "alias/pii");
    }

    #[test]
    fn failure_sets_error_severity() {
        let sink = MemorySink::new();
        let logger = AuditLogger::new().with_sink(Arc::new(sink.clone()));
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        logger.failure(AuditEventName::DecryptionFailed, AuditDetails::new(), &err);

        let ev = &sink.events()[0];
        assert_eq!(ev.severity, Severity::Error);
        assert_eq!(ev.error.as_ref().unwrap().message, "boom");
    }

    #[tokio::test]
    async fn failing_forwarder_does_not_affect_sinks() {
        let sink = MemorySink::new();
        let forwarder =
            WebhookForwarder::new("http://127.0.0.1:9/audit", None, Duration::from_millis(200))
                .unwrap();
        let logger = AuditLogger::new()
            .with_sink(Arc::new(sink.clone()))
            .with_forwarder(forwarder);
        assert!(logger.is_forwarding());

        logger.success(AuditEventName::DataDecrypted, AuditDetails::new());
        assert!(sink.contains(AuditEventName::DataDecrypted));
    }
}
