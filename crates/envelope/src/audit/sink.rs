//! Destinations that receive every audit event synchronously.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info};

use super::event::{AuditEvent, AuditEventName};

/// A synchronous audit destination.
///
/// `record` is called on the crypto call path. Implementations must not block
/// on I/O beyond what a local log write costs.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Primary sink: one structured `tracing` event per audit record under the
/// `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, event: &AuditEvent) {
        let details = serde_json::to_string(&event.details).unwrap_or_default();
        let timestamp = event.timestamp.to_rfc3339();
        match &event.error {
            None => info!(
                target: "audit",
                event = event.event_name.as_str(),
                severity = "INFO",
                timestamp = %timestamp,
                details = %details,
                "audit"
            ),
            Some(err) => error!(
                target: "audit",
                event = event.event_name.as_str(),
                severity = "ERROR",
                timestamp = %timestamp,
                details = %details,
                error = %err.message,
                error_chain = ?err.chain,
                "audit"
            ),
        }
    }
}

/// In-memory sink that keeps every event it sees.
///
/// Cloning shares the underlying buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    /// Recorded event names, oldest first.
    pub fn names(&self) -> Vec<AuditEventName> {
        self.lock().iter().map(|e| e.event_name).collect()
    }

    pub fn contains(&self, name: AuditEventName) -> bool {
        self.lock().iter().any(|e| e.event_name == name)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        // A panic while holding the lock cannot leave a Vec half-written.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: &AuditEvent) {
        self.lock().push(event.clone());
    }
}
