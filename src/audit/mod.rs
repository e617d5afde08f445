//! Security audit events.
//!
//! Every authentication transition and gate rejection emits exactly one
//! structured event. Emission is fire-and-forget: a sink must never block
//! or fail the request path. The caller-visible response and the audited
//! reason are deliberately decoupled — the event carries the precise
//! reason even when the caller only sees a generic message.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub success: bool,
    pub method: String,
    pub ip_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn authentication(method: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            event_type: "authentication".to_string(),
            user_id: None,
            success: false,
            method: method.into(),
            ip_address: ip_address.into(),
            reason: None,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn security(method: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            event_type: "security".to_string(),
            ..Self::authentication(method, ip_address)
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.success = true;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn correlated(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// One-way event emitter. Implementations must return promptly and swallow
/// their own failures; auditing is best-effort by contract.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Default sink: structured `tracing` events on the `audit` target, picked
/// up by whatever subscriber the host process installs.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            event_type = %event.event_type,
            user_id = event.user_id.as_deref(),
            success = event.success,
            method = %event.method,
            ip_address = %event.ip_address,
            reason = event.reason.as_deref(),
            correlation_id = ?event.correlation_id,
            timestamp = %event.timestamp.to_rfc3339(),
        );
    }
}

/// Buffering sink for tests and local inspection.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit buffer poisoned").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("audit buffer poisoned").clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        // A poisoned buffer only matters to the test that poisoned it.
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
