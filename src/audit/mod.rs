//! Security events and audit sinks.
//!
//! Events are immutable once built and emitted fire-and-forget; delivery
//! and retention belong to the sink. Emission is synchronous on the
//! request path, so events for one request keep their order
//! (received → classified → decision → completed).

use std::net::IpAddr;
use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

/// Event severity for triage and log level selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    RequestReceived,
    RequestClassified,
    RequestCompleted,
    CsrfViolation,
    OriginViolation,
    RateLimitExceeded,
    IpBlocked,
    SuspiciousIp,
    BruteForceAttempt,
    DataAccess,
    DataModification,
    StoreDegraded,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::RequestReceived => "REQUEST_RECEIVED",
            SecurityEventKind::RequestClassified => "REQUEST_CLASSIFIED",
            SecurityEventKind::RequestCompleted => "REQUEST_COMPLETED",
            SecurityEventKind::CsrfViolation => "CSRF_VIOLATION",
            SecurityEventKind::OriginViolation => "ORIGIN_VIOLATION",
            SecurityEventKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            SecurityEventKind::IpBlocked => "IP_BLOCKED",
            SecurityEventKind::SuspiciousIp => "SUSPICIOUS_IP",
            SecurityEventKind::BruteForceAttempt => "BRUTE_FORCE_ATTEMPT",
            SecurityEventKind::DataAccess => "DATA_ACCESS",
            SecurityEventKind::DataModification => "DATA_MODIFICATION",
            SecurityEventKind::StoreDegraded => "STORE_DEGRADED",
        }
    }
}

/// Request metadata attached to every event.
#[derive(Debug, Clone, Serialize)]
pub struct ClientContext {
    pub ip: IpAddr,
    pub method: String,
    pub path: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

/// Immutable audit record.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub timestamp_ms: u64,
    pub client: ClientContext,
    pub details: serde_json::Value,
}

impl SecurityEvent {
    pub fn new(
        kind: SecurityEventKind,
        severity: Severity,
        timestamp_ms: u64,
        client: ClientContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            timestamp_ms,
            client,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Fire-and-forget audit destination. The core never retries emission.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: SecurityEvent);
}

/// Sink that forwards events to the tracing subscriber, one structured
/// log line per event, level chosen from severity.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn emit(&self, event: SecurityEvent) {
        let details =
            serde_json::to_string(&event.details).unwrap_or_else(|_| "null".to_string());
        match event.severity {
            Severity::Low => tracing::info!(
                event = event.kind.as_str(),
                ip = %event.client.ip,
                path = %event.client.path,
                details = %details,
                "security event"
            ),
            Severity::Medium => tracing::warn!(
                event = event.kind.as_str(),
                ip = %event.client.ip,
                path = %event.client.path,
                details = %details,
                "security event"
            ),
            Severity::High | Severity::Critical => tracing::error!(
                event = event.kind.as_str(),
                severity = ?event.severity,
                ip = %event.client.ip,
                path = %event.client.path,
                details = %details,
                "security event"
            ),
        }
    }
}

/// In-memory sink for assertions in tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().expect("memory sink mutex poisoned").clone()
    }

    pub fn count_of(&self, kind: SecurityEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, event: SecurityEvent) {
        self.events
            .lock()
            .expect("memory sink mutex poisoned")
            .push(event);
    }
}
