//! Per-IP and per-user activity tracking.
//!
//! The `RiskStore` trait keeps the backend pluggable: the in-memory map
//! is correct for a single instance, while clustered deployments can
//! plug in a shared-store implementation without touching the engine.

use std::net::IpAddr;

use dashmap::DashMap;

/// Rolling activity for one IP.
///
/// State machine: unseen → tracked → suspicious (count > hourly
/// threshold) → blocked (weighted failures > block threshold). There is
/// no automatic unblock; clearing `blocked` is an operator action.
#[derive(Debug, Clone)]
pub struct IpActivity {
    /// Rolling request count within the hourly window.
    pub count: u32,
    /// Weighted failed-login accumulator within the hourly window.
    pub failed_weight: u32,
    pub last_attempt_ms: u64,
    pub suspicious: bool,
    pub blocked: bool,
}

/// Lightweight anomaly signals for one authenticated user.
#[derive(Debug, Clone)]
pub struct UserActivity {
    pub login_ms: u64,
    pub last_activity_ms: u64,
    pub ip: IpAddr,
    pub user_agent: Option<String>,
    pub action_count: u64,
}

/// Snapshot returned by tracking operations.
#[derive(Debug, Clone, Copy)]
pub struct IpSnapshot {
    pub count: u32,
    pub failed_weight: u32,
    pub suspicious: bool,
    pub blocked: bool,
    /// True when this call flipped the record to blocked.
    pub newly_blocked: bool,
}

/// Pluggable backend for the risk engine's state.
pub trait RiskStore: Send + Sync {
    /// Count an ordinary request (+1) and refresh last-attempt time.
    fn record_request(&self, ip: IpAddr, now_ms: u64) -> IpSnapshot;

    /// Count a failed login with its heavy weight.
    fn record_failed_login(&self, ip: IpAddr, weight: u32, now_ms: u64) -> IpSnapshot;

    /// Blocked or suspicious IPs are refused outright.
    fn is_blocked(&self, ip: IpAddr) -> bool;

    /// Rolling count without mutating the record.
    fn rolling_count(&self, ip: IpAddr) -> u32;

    /// True when the IP is in the suspicious set.
    fn is_suspicious(&self, ip: IpAddr) -> bool;

    /// Refresh a user's session record.
    fn touch_user(&self, user_id: &str, ip: IpAddr, user_agent: Option<&str>, now_ms: u64);

    /// Evict records idle longer than `idle_ms`. Returns evicted count.
    fn sweep(&self, now_ms: u64, idle_ms: u64) -> usize;
}

const IDLE_RESET_MS: u64 = 60 * 60 * 1000;

/// Single-instance backend over concurrent maps.
pub struct MemoryRiskStore {
    ips: DashMap<IpAddr, IpActivity>,
    users: DashMap<String, UserActivity>,
    suspicious_threshold: u32,
    block_threshold: u32,
    max_tracked_ips: usize,
}

impl MemoryRiskStore {
    pub fn new(suspicious_threshold: u32, block_threshold: u32, max_tracked_ips: usize) -> Self {
        Self {
            ips: DashMap::new(),
            users: DashMap::new(),
            suspicious_threshold,
            block_threshold,
            max_tracked_ips,
        }
    }

    /// `failure_weight` of zero counts an ordinary request; anything
    /// else feeds the brute-force accumulator, which alone can block.
    fn track(&self, ip: IpAddr, failure_weight: u32, now_ms: u64) -> IpSnapshot {
        self.enforce_bound(ip);

        let mut record = self.ips.entry(ip).or_insert_with(|| IpActivity {
            count: 0,
            failed_weight: 0,
            last_attempt_ms: now_ms,
            suspicious: false,
            blocked: false,
        });

        // The rolling window resets after an hour of silence. A block
        // survives the reset: there is no automatic unblock.
        if now_ms.saturating_sub(record.last_attempt_ms) > IDLE_RESET_MS {
            record.count = 0;
            record.failed_weight = 0;
            record.suspicious = false;
        }

        if failure_weight == 0 {
            record.count = record.count.saturating_add(1);
        } else {
            record.failed_weight = record.failed_weight.saturating_add(failure_weight);
        }
        record.last_attempt_ms = now_ms;

        if record.count > self.suspicious_threshold {
            record.suspicious = true;
        }

        let mut newly_blocked = false;
        if !record.blocked && record.failed_weight > self.block_threshold {
            record.blocked = true;
            newly_blocked = true;
        }

        IpSnapshot {
            count: record.count,
            failed_weight: record.failed_weight,
            suspicious: record.suspicious,
            blocked: record.blocked,
            newly_blocked,
        }
    }

    /// Keep the map bounded: when full, drop the stalest record before
    /// inserting a new IP. Linear scan, but only on overflow.
    fn enforce_bound(&self, ip: IpAddr) {
        if self.ips.len() < self.max_tracked_ips || self.ips.contains_key(&ip) {
            return;
        }
        let stalest = self
            .ips
            .iter()
            .min_by_key(|r| r.value().last_attempt_ms)
            .map(|r| *r.key());
        if let Some(victim) = stalest {
            self.ips.remove(&victim);
            tracing::debug!(ip = %victim, "evicted stalest IP record at capacity");
        }
    }
}

impl RiskStore for MemoryRiskStore {
    fn record_request(&self, ip: IpAddr, now_ms: u64) -> IpSnapshot {
        self.track(ip, 0, now_ms)
    }

    fn record_failed_login(&self, ip: IpAddr, weight: u32, now_ms: u64) -> IpSnapshot {
        self.track(ip, weight.max(1), now_ms)
    }

    fn is_blocked(&self, ip: IpAddr) -> bool {
        self.ips
            .get(&ip)
            .map(|r| r.blocked || r.suspicious)
            .unwrap_or(false)
    }

    fn rolling_count(&self, ip: IpAddr) -> u32 {
        self.ips.get(&ip).map(|r| r.count).unwrap_or(0)
    }

    fn is_suspicious(&self, ip: IpAddr) -> bool {
        self.ips.get(&ip).map(|r| r.suspicious).unwrap_or(false)
    }

    fn touch_user(&self, user_id: &str, ip: IpAddr, user_agent: Option<&str>, now_ms: u64) {
        let mut record = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserActivity {
                login_ms: now_ms,
                last_activity_ms: now_ms,
                ip,
                user_agent: user_agent.map(|s| s.to_string()),
                action_count: 0,
            });
        record.last_activity_ms = now_ms;
        record.ip = ip;
        record.action_count += 1;
    }

    fn sweep(&self, now_ms: u64, idle_ms: u64) -> usize {
        let before = self.ips.len() + self.users.len();
        self.ips
            .retain(|_, r| now_ms.saturating_sub(r.last_attempt_ms) <= idle_ms);
        self.users
            .retain(|_, r| now_ms.saturating_sub(r.last_activity_ms) <= idle_ms);
        before - (self.ips.len() + self.users.len())
    }
}
