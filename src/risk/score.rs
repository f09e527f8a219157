//! Additive risk scoring.
//!
//! A heuristic triage signal for logging verbosity and sweep priorities,
//! not a blocking decision by itself.

use crate::config::schema::RiskConfig;

/// Triage level derived from the additive score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Signals feeding one classification.
#[derive(Debug, Clone, Copy)]
pub struct RiskSignals<'a> {
    /// IP already flagged suspicious by the tracker.
    pub suspicious_ip: bool,
    /// Request carried a non-empty User-Agent.
    pub has_user_agent: bool,
    /// Rolling request count for this IP.
    pub rolling_count: u32,
    /// Request path as received.
    pub path: &'a str,
}

const SUSPICIOUS_IP_WEIGHT: u32 = 50;
const MISSING_USER_AGENT_WEIGHT: u32 = 20;
const HIGH_TRAFFIC_WEIGHT: u32 = 30;
const HOSTILE_PATH_WEIGHT: u32 = 100;

/// Compute the additive score and its level.
pub fn classify(signals: &RiskSignals<'_>, config: &RiskConfig) -> (RiskLevel, u32) {
    let mut score = 0;

    if signals.suspicious_ip {
        score += SUSPICIOUS_IP_WEIGHT;
    }
    if !signals.has_user_agent {
        score += MISSING_USER_AGENT_WEIGHT;
    }
    if signals.rolling_count > config.high_traffic_count {
        score += HIGH_TRAFFIC_WEIGHT;
    }
    if hostile_path(signals.path) {
        score += HOSTILE_PATH_WEIGHT;
    }

    let level = if score >= config.critical_score {
        RiskLevel::Critical
    } else if score >= config.high_score {
        RiskLevel::High
    } else if score >= config.medium_score {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    (level, score)
}

/// Directory traversal or raw script-tag markers in the path.
fn hostile_path(path: &str) -> bool {
    path.contains("..") || path.to_ascii_lowercase().contains("<script")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(path: &str) -> RiskSignals<'_> {
        RiskSignals {
            suspicious_ip: false,
            has_user_agent: true,
            rolling_count: 0,
            path,
        }
    }

    #[test]
    fn test_clean_request_is_low() {
        let (level, score) = classify(&signals("/api/data"), &RiskConfig::default());
        assert_eq!(level, RiskLevel::Low);
        assert_eq!(score, 0);
    }

    #[test]
    fn test_hostile_path_is_critical() {
        let config = RiskConfig::default();
        let (level, score) = classify(&signals("/files/../../etc/passwd"), &config);
        assert_eq!(level, RiskLevel::Critical);
        assert_eq!(score, 100);

        let (level, _) = classify(&signals("/search?q=<script>alert(1)</script>"), &config);
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn test_additive_weights() {
        let config = RiskConfig::default();

        // suspicious (50) + missing UA (20) = 70 → high
        let s = RiskSignals {
            suspicious_ip: true,
            has_user_agent: false,
            rolling_count: 0,
            path: "/api/data",
        };
        let (level, score) = classify(&s, &config);
        assert_eq!(score, 70);
        assert_eq!(level, RiskLevel::High);

        // + heavy traffic (30) = 100 → critical
        let s = RiskSignals {
            rolling_count: 51,
            ..s
        };
        let (level, score) = classify(&s, &config);
        assert_eq!(score, 100);
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn test_medium_band() {
        let config = RiskConfig::default();
        let s = RiskSignals {
            suspicious_ip: true,
            has_user_agent: true,
            rolling_count: 0,
            path: "/api/data",
        };
        let (level, score) = classify(&s, &config);
        assert_eq!(score, 50);
        assert_eq!(level, RiskLevel::Medium);
    }

    #[test]
    fn test_traffic_threshold_is_exclusive() {
        let config = RiskConfig::default();
        let s = RiskSignals {
            suspicious_ip: false,
            has_user_agent: true,
            rolling_count: config.high_traffic_count,
            path: "/api/data",
        };
        let (_, score) = classify(&s, &config);
        assert_eq!(score, 0, "count must exceed the threshold");
    }
}
