//! Audit sink for captcha and account-wall redirects.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A redirect that landed on a vendor's crawler-prevention page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub requested_url: String,
    pub redirect_url: String,
}

/// Destination for audit events. Recording must not fail the fetch.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Logs audit events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        tracing::warn!(
            target: "oafinder::audit",
            requested_url = %event.requested_url,
            redirect_url = %event.redirect_url,
            user_agent = event.user_agent.as_deref().unwrap_or(""),
            "captcha redirect"
        );
    }
}

/// Keeps events in memory; used by the CLI report and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
