//! Sliding-window admission against the shared store.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};

use crate::config::schema::RoutePolicy;
use crate::observability::metrics;
use crate::store::{Clock, StoreError, WindowSnapshot, WindowStore};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub total_hits: u32,
    pub remaining: u32,
    /// When the oldest surviving entry leaves the window.
    pub reset_ms: u64,
    /// Seconds until the window frees a slot, per the RateLimit header
    /// drafts (delta seconds, not an absolute timestamp).
    pub reset_after_secs: u64,
    /// Seconds the client should wait before retrying (rejections only).
    pub retry_after_secs: u64,
    /// True when the store was unreachable and the limiter failed open.
    pub degraded: bool,
}

impl RateDecision {
    /// Standard rate headers on every limited response.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("RateLimit-Limit", int_header(self.limit as u64));
        headers.insert("RateLimit-Remaining", int_header(self.remaining as u64));
        headers.insert("RateLimit-Reset", int_header(self.reset_after_secs));
    }
}

fn int_header(value: u64) -> HeaderValue {
    // Decimal digits are always a valid header value.
    HeaderValue::from_str(&value.to_string()).expect("numeric header value")
}

/// Sliding-window rate limiter over a `WindowStore`.
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    op_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>, op_timeout_ms: u64) -> Self {
        Self {
            store,
            clock,
            op_timeout: Duration::from_millis(op_timeout_ms),
        }
    }

    /// Check a request against a policy's budget.
    ///
    /// Store outage or timeout fails open: the request is allowed, the
    /// decision is marked degraded, and the caller audits it.
    pub async fn admit(&self, key: &str, policy: &RoutePolicy) -> RateDecision {
        let now = self.clock.now_ms();

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            self.op_timeout,
            self.store.admit(key, now, policy.window_ms, policy.max),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.op_timeout.as_millis() as u64))
        .and_then(|inner| inner);
        metrics::record_store_latency(started.elapsed().as_secs_f64());

        match result {
            Ok(snapshot) => self.decide(now, policy, snapshot),
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    policy = %policy.name,
                    error = %err,
                    "rate limit store unavailable, failing open"
                );
                metrics::record_store_degraded();
                RateDecision {
                    allowed: true,
                    limit: policy.max,
                    total_hits: 0,
                    remaining: policy.max,
                    reset_ms: now + policy.window_ms,
                    reset_after_secs: policy.window_ms.div_ceil(1000),
                    retry_after_secs: 0,
                    degraded: true,
                }
            }
        }
    }

    fn decide(&self, now: u64, policy: &RoutePolicy, snapshot: WindowSnapshot) -> RateDecision {
        let reset_ms = snapshot.oldest_ms + policy.window_ms;
        let reset_after_secs = reset_ms.saturating_sub(now).div_ceil(1000);
        if snapshot.admitted {
            RateDecision {
                allowed: true,
                limit: policy.max,
                total_hits: snapshot.total_hits,
                remaining: policy.max.saturating_sub(snapshot.total_hits),
                reset_ms,
                reset_after_secs,
                retry_after_secs: 0,
                degraded: false,
            }
        } else {
            RateDecision {
                allowed: false,
                limit: policy.max,
                total_hits: snapshot.total_hits,
                remaining: 0,
                reset_ms,
                reset_after_secs,
                retry_after_secs: reset_after_secs.max(1),
                degraded: false,
            }
        }
    }

    /// Undo an earlier reservation, used by the completion hook when a
    /// policy skips successful or failed requests. Best effort.
    pub async fn decrement(&self, key: &str) {
        let result = tokio::time::timeout(self.op_timeout, self.store.decrement(key)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(key = %key, error = %err, "rate limit decrement failed")
            }
            Err(_) => tracing::warn!(key = %key, "rate limit decrement timed out"),
        }
    }

    /// Administrative override: clear a key's window immediately.
    pub async fn reset(&self, key: &str) -> Result<(), StoreError> {
        tokio::time::timeout(self.op_timeout, self.store.reset(key))
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout.as_millis() as u64))
            .and_then(|inner| inner)
    }
}
