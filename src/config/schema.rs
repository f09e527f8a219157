//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! request-security core. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request-security core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration for the demo gateway binary.
    pub listener: ListenerConfig,

    /// CSRF protection settings.
    pub csrf: CsrfConfig,

    /// Rate limiting policy table.
    pub rate_limit: RateLimitConfig,

    /// Risk scoring and auto-block settings.
    pub risk: RiskConfig,

    /// Shared store adapter settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// CSRF verification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CsrfStrategy {
    /// Session-bound HMAC tokens verified against a server-held secret.
    HmacSession,
    /// Stateless double-submit: header token must equal cookie token.
    DoubleSubmitCookie,
}

/// CSRF protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Enable CSRF verification for unsafe methods.
    pub enabled: bool,

    /// Verification strategy.
    pub strategy: CsrfStrategy,

    /// Request header carrying the token.
    pub header_name: String,

    /// Cookie carrying the token (double-submit strategy).
    pub cookie_name: String,

    /// Cookie carrying the session identifier.
    pub session_cookie: String,

    /// Methods exempt from verification.
    pub safe_methods: Vec<String>,

    /// Path prefixes exempt from verification (e.g., login, webhooks).
    pub exempt_paths: Vec<String>,

    /// Explicit origin allow-list (e.g., "https://app.example.com").
    /// The request's own host is always accepted.
    pub allowed_origins: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CsrfStrategy::HmacSession,
            header_name: "x-csrf-token".to_string(),
            cookie_name: "csrf_token".to_string(),
            session_cookie: "session_id".to_string(),
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
            ],
            exempt_paths: vec![
                "/api/auth/login".to_string(),
                "/api/auth/register".to_string(),
                "/api/csrf/token".to_string(),
            ],
            allowed_origins: Vec::new(),
        }
    }
}

/// How the limiting key is derived for a route policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// Client IP address.
    Ip,
    /// Authenticated user id, falling back to IP for anonymous clients.
    User,
    /// Client IP combined with the request path.
    IpAndPath,
    /// A request header value (e.g., submitted email), falling back to IP.
    IdentityHeader,
}

/// A single per-route rate limiting policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutePolicy {
    /// Policy identifier for logging/metrics and key namespacing.
    pub name: String,

    /// Path prefix to match. Longest matching prefix wins.
    pub path_prefix: String,

    /// Methods this policy applies to (empty = all).
    #[serde(default)]
    pub methods: Vec<String>,

    /// Maximum admitted requests within the window.
    pub max: u32,

    /// Trailing window length in milliseconds.
    pub window_ms: u64,

    /// Limiting key derivation.
    #[serde(default = "default_key_strategy")]
    pub key_by: KeyStrategy,

    /// Header consulted by `KeyStrategy::IdentityHeader`.
    #[serde(default)]
    pub identity_header: Option<String>,

    /// Refund the budget slot when the response succeeds (2xx/3xx).
    #[serde(default)]
    pub skip_successful: bool,

    /// Refund the budget slot when the response fails (4xx/5xx).
    #[serde(default)]
    pub skip_failed: bool,

    /// Feed 401/403 responses on this route into brute-force tracking.
    #[serde(default)]
    pub track_failures: bool,
}

fn default_key_strategy() -> KeyStrategy {
    KeyStrategy::Ip
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Per-route policies.
    pub policies: Vec<RoutePolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policies: vec![
                RoutePolicy {
                    name: "general-api".to_string(),
                    path_prefix: "/api".to_string(),
                    methods: Vec::new(),
                    max: 100,
                    window_ms: 15 * 60 * 1000,
                    key_by: KeyStrategy::Ip,
                    identity_header: None,
                    skip_successful: false,
                    skip_failed: false,
                    track_failures: false,
                },
                RoutePolicy {
                    name: "auth".to_string(),
                    path_prefix: "/api/auth".to_string(),
                    methods: vec!["POST".to_string()],
                    max: 5,
                    window_ms: 15 * 60 * 1000,
                    key_by: KeyStrategy::Ip,
                    identity_header: None,
                    skip_successful: true,
                    skip_failed: false,
                    track_failures: true,
                },
                RoutePolicy {
                    name: "password-reset".to_string(),
                    path_prefix: "/api/auth/password-reset".to_string(),
                    methods: vec!["POST".to_string()],
                    max: 3,
                    window_ms: 60 * 60 * 1000,
                    key_by: KeyStrategy::IdentityHeader,
                    identity_header: Some("x-account-email".to_string()),
                    skip_successful: false,
                    skip_failed: false,
                    track_failures: false,
                },
                RoutePolicy {
                    name: "uploads".to_string(),
                    path_prefix: "/api/uploads".to_string(),
                    methods: vec!["POST".to_string(), "PUT".to_string()],
                    max: 10,
                    window_ms: 60 * 60 * 1000,
                    key_by: KeyStrategy::Ip,
                    identity_header: None,
                    skip_successful: false,
                    skip_failed: false,
                    track_failures: false,
                },
            ],
        }
    }
}

/// Risk scoring and auto-block configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Hourly request count above which an IP is flagged suspicious.
    pub suspicious_hourly_threshold: u32,

    /// Weighted count above which an IP is auto-blocked.
    pub block_weight_threshold: u32,

    /// Weight added per failed login (ordinary requests add 1).
    pub failed_login_weight: u32,

    /// Rolling request count above which classification adds its weight.
    pub high_traffic_count: u32,

    /// Score thresholds for risk levels.
    pub medium_score: u32,
    pub high_score: u32,
    pub critical_score: u32,

    /// Interval between sweeps of the risk maps, in seconds.
    pub sweep_interval_secs: u64,

    /// Records idle longer than this are evicted by the sweep, in seconds.
    pub idle_eviction_secs: u64,

    /// Upper bound on tracked IPs; oldest records are evicted on overflow.
    pub max_tracked_ips: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            suspicious_hourly_threshold: 100,
            block_weight_threshold: 50,
            failed_login_weight: 10,
            high_traffic_count: 50,
            medium_score: 40,
            high_score: 70,
            critical_score: 100,
            sweep_interval_secs: 3600,
            idle_eviction_secs: 24 * 3600,
            max_tracked_ips: 100_000,
        }
    }
}

/// Shared store adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Per-operation deadline in milliseconds. On timeout the limiter
    /// fails open and CSRF verification fails closed.
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { op_timeout_ms: 250 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_table() {
        let config = GuardConfig::default();
        assert!(config.rate_limit.enabled);

        let auth = config
            .rate_limit
            .policies
            .iter()
            .find(|p| p.name == "auth")
            .unwrap();
        assert_eq!(auth.max, 5);
        assert!(auth.skip_successful);
        assert!(auth.track_failures);
    }

    #[test]
    fn test_strategy_deserializes_kebab_case() {
        let config: CsrfConfig =
            toml::from_str("strategy = \"double-submit-cookie\"").unwrap();
        assert_eq!(config.strategy, CsrfStrategy::DoubleSubmitCookie);
    }

    #[test]
    fn test_safe_methods_default() {
        let config = CsrfConfig::default();
        assert!(config.safe_methods.iter().any(|m| m == "GET"));
        assert!(!config.safe_methods.iter().any(|m| m == "POST"));
    }
}
