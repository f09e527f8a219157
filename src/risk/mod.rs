//! Risk & audit engine.
//!
//! # Data Flow
//! ```text
//! pipeline:
//!     → is_blocked (cheap gate, before any other work)
//!     → observe_request (track + classify + audit)
//!     → ... handler ...
//!     → note_failed_login (completion hook, on 401/403 auth routes)
//!
//! background: hourly sweep evicting idle IP/user records
//! ```

pub mod score;
pub mod tracker;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

pub use score::{classify, RiskLevel, RiskSignals};
pub use tracker::{IpSnapshot, MemoryRiskStore, RiskStore};

use crate::audit::{AuditSink, ClientContext, SecurityEvent, SecurityEventKind, Severity};
use crate::config::schema::RiskConfig;
use crate::observability::metrics;
use crate::store::Clock;

/// Aggregates per-client activity, scores requests, and escalates to
/// auto-block. Owns the audit emission for risk decisions.
pub struct RiskEngine {
    store: Arc<dyn RiskStore>,
    config: RiskConfig,
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl RiskEngine {
    pub fn new(
        store: Arc<dyn RiskStore>,
        config: RiskConfig,
        sink: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            sink,
            clock,
        }
    }

    /// Cheap short-circuit consulted before any other processing.
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        self.store.is_blocked(ip)
    }

    /// Track the request, classify it, and emit the classification
    /// event. Returns the triage level.
    pub fn observe_request(&self, client: &ClientContext) -> RiskLevel {
        let now = self.clock.now_ms();
        let snapshot = self.store.record_request(client.ip, now);

        if let Some(user_id) = &client.user_id {
            self.store
                .touch_user(user_id, client.ip, client.user_agent.as_deref(), now);
        }

        // Requests add 1 at a time, so the count sits exactly one past
        // the threshold on the request that flipped the flag.
        if snapshot.suspicious && snapshot.count == self.config.suspicious_hourly_threshold + 1 {
            tracing::warn!(
                ip = %client.ip,
                rolling_count = snapshot.count,
                "IP flagged suspicious by hourly volume"
            );
            self.sink.emit(
                SecurityEvent::new(SecurityEventKind::SuspiciousIp, Severity::High, now, client.clone())
                    .with_details(serde_json::json!({ "rolling_count": snapshot.count })),
            );
        }

        let signals = RiskSignals {
            suspicious_ip: snapshot.suspicious,
            has_user_agent: client
                .user_agent
                .as_deref()
                .map(|ua| !ua.trim().is_empty())
                .unwrap_or(false),
            rolling_count: snapshot.count,
            path: &client.path,
        };
        let (level, score) = classify(&signals, &self.config);
        metrics::record_risk_level(level.as_str());

        let severity = match level {
            RiskLevel::Low => Severity::Low,
            RiskLevel::Medium => Severity::Medium,
            RiskLevel::High => Severity::High,
            RiskLevel::Critical => Severity::Critical,
        };
        self.sink.emit(
            SecurityEvent::new(SecurityEventKind::RequestClassified, severity, now, client.clone())
                .with_details(serde_json::json!({
                    "risk_level": level.as_str(),
                    "score": score,
                    "rolling_count": snapshot.count,
                })),
        );

        level
    }

    /// Heavy penalty for a failed authentication attempt. Crossing the
    /// block threshold emits exactly one critical brute-force event.
    pub fn note_failed_login(&self, client: &ClientContext) {
        let now = self.clock.now_ms();
        let snapshot =
            self.store
                .record_failed_login(client.ip, self.config.failed_login_weight, now);

        if snapshot.newly_blocked {
            tracing::error!(
                ip = %client.ip,
                weighted_count = snapshot.failed_weight,
                "IP auto-blocked after repeated failed logins"
            );
            self.sink.emit(
                SecurityEvent::new(
                    SecurityEventKind::BruteForceAttempt,
                    Severity::Critical,
                    now,
                    client.clone(),
                )
                .with_details(serde_json::json!({
                    "auto_blocked": true,
                    "weighted_count": snapshot.failed_weight,
                })),
            );
        }
    }

    /// Audit helper: always writes a trail entry, and emits a security
    /// event when the data is flagged sensitive or personal.
    pub fn record_data_access(&self, client: &ClientContext, resource: &str, sensitive: bool, personal: bool) {
        self.record_data_event(SecurityEventKind::DataAccess, client, resource, sensitive, personal);
    }

    /// Like `record_data_access`, for mutations.
    pub fn record_data_modification(&self, client: &ClientContext, resource: &str, sensitive: bool, personal: bool) {
        self.record_data_event(SecurityEventKind::DataModification, client, resource, sensitive, personal);
    }

    fn record_data_event(
        &self,
        kind: SecurityEventKind,
        client: &ClientContext,
        resource: &str,
        sensitive: bool,
        personal: bool,
    ) {
        tracing::info!(
            ip = %client.ip,
            user = client.user_id.as_deref().unwrap_or("anonymous"),
            resource = %resource,
            kind = kind.as_str(),
            "audit trail"
        );

        if sensitive || personal {
            // Personal data escalates the severity a step.
            let severity = if personal { Severity::High } else { Severity::Medium };
            self.sink.emit(
                SecurityEvent::new(kind, severity, self.clock.now_ms(), client.clone())
                    .with_details(serde_json::json!({
                        "resource": resource,
                        "sensitive": sensitive,
                        "personal": personal,
                    })),
            );
        }
    }

    /// Run the periodic sweep until shutdown. Spawned once at startup.
    pub async fn run_sweeper(
        self: Arc<Self>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        // First tick fires immediately; skip it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.clock.now_ms();
                    let idle_ms = self.config.idle_eviction_secs * 1000;
                    let evicted = self.store.sweep(now, idle_ms);
                    if evicted > 0 {
                        tracing::info!(evicted, "risk sweep evicted idle records");
                    }
                    metrics::record_sweep(evicted);
                }
                _ = shutdown.recv() => {
                    tracing::debug!("risk sweeper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::store::ManualClock;

    fn client(ip: &str) -> ClientContext {
        ClientContext {
            ip: ip.parse().unwrap(),
            method: "POST".to_string(),
            path: "/api/auth/login".to_string(),
            session_id: None,
            user_id: None,
            user_agent: Some("test-agent".to_string()),
            request_id: None,
        }
    }

    fn engine() -> (Arc<RiskEngine>, Arc<MemorySink>, Arc<ManualClock>) {
        let config = RiskConfig::default();
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemoryRiskStore::new(
            config.suspicious_hourly_threshold,
            config.block_weight_threshold,
            config.max_tracked_ips,
        ));
        let engine = Arc::new(RiskEngine::new(store, config, sink.clone(), clock.clone()));
        (engine, sink, clock)
    }

    #[test]
    fn test_brute_force_blocks_and_emits_once() {
        let (engine, sink, _) = engine();
        let client = client("10.0.0.1");

        for _ in 0..5 {
            engine.note_failed_login(&client);
        }
        assert!(!engine.is_blocked(client.ip), "50 is not over the threshold");

        engine.note_failed_login(&client);
        assert!(engine.is_blocked(client.ip));

        // Further failures do not re-emit.
        engine.note_failed_login(&client);
        assert_eq!(sink.count_of(SecurityEventKind::BruteForceAttempt), 1);

        let event = sink
            .events()
            .into_iter()
            .find(|e| e.kind == SecurityEventKind::BruteForceAttempt)
            .unwrap();
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.details["auto_blocked"], true);
    }

    #[test]
    fn test_mixed_traffic_blocks_only_on_failures() {
        let (engine, _, _) = engine();
        let client = client("10.0.0.8");

        // Heavy but benign traffic plus a single failed login must not
        // block: ordinary requests never feed the failure accumulator.
        for _ in 0..45 {
            engine.observe_request(&client);
        }
        engine.note_failed_login(&client);
        assert!(!engine.is_blocked(client.ip));

        for _ in 0..5 {
            engine.note_failed_login(&client);
        }
        assert!(engine.is_blocked(client.ip), "six failures block");
    }

    #[test]
    fn test_observe_request_emits_classification() {
        let (engine, sink, _) = engine();
        let level = engine.observe_request(&client("10.0.0.2"));
        assert_eq!(level, RiskLevel::Low);
        assert_eq!(sink.count_of(SecurityEventKind::RequestClassified), 1);
    }

    #[test]
    fn test_suspicious_flood_emits_once() {
        let (engine, sink, _) = engine();
        let c = client("10.0.0.9");
        for _ in 0..105 {
            engine.observe_request(&c);
        }
        assert!(engine.is_blocked(c.ip), "suspicious IPs are refused");
        assert_eq!(sink.count_of(SecurityEventKind::SuspiciousIp), 1);
    }

    #[test]
    fn test_hostile_path_classified_critical() {
        let (engine, _, _) = engine();
        let mut c = client("10.0.0.3");
        c.path = "/files/../../etc/shadow".to_string();
        assert_eq!(engine.observe_request(&c), RiskLevel::Critical);
    }

    #[test]
    fn test_data_access_event_only_when_flagged() {
        let (engine, sink, _) = engine();
        let c = client("10.0.0.4");

        engine.record_data_access(&c, "reports/42", false, false);
        assert_eq!(sink.count_of(SecurityEventKind::DataAccess), 0);

        engine.record_data_access(&c, "patients/42", true, false);
        engine.record_data_modification(&c, "patients/42", true, true);

        assert_eq!(sink.count_of(SecurityEventKind::DataAccess), 1);
        let modification = sink
            .events()
            .into_iter()
            .find(|e| e.kind == SecurityEventKind::DataModification)
            .unwrap();
        assert_eq!(modification.severity, Severity::High, "personal escalates");
    }
}
