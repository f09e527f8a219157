//! In-memory store backend.
//!
//! Single-instance backend for the window and secret stores. DashMap's
//! entry API gives per-key locking, which is what makes `admit` atomic:
//! prune, insert, count, and conditional rollback all happen while the
//! key's shard lock is held.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;

use crate::store::{Clock, SecretStore, StoreError, WindowSnapshot, WindowStore};

const SECRET_LEN: usize = 32;

/// One limiting key's window of request timestamps.
struct RateWindow {
    /// Request timestamps in epoch milliseconds, insertion order.
    entries: Vec<u64>,
    /// The whole key expires after this instant, so abandoned keys
    /// vanish without a sweeper walking every window.
    expires_at_ms: u64,
}

struct SecretEntry {
    secret: Vec<u8>,
    last_used_ms: u64,
}

/// DashMap-backed implementation of both store traits.
pub struct MemoryStore {
    windows: DashMap<String, RateWindow>,
    secrets: DashMap<String, SecretEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            secrets: DashMap::new(),
            clock,
        }
    }

    /// Drop expired windows and secrets idle longer than `idle_ms`.
    /// Called by the background sweep task.
    pub fn sweep(&self, now_ms: u64, idle_ms: u64) -> usize {
        let before = self.windows.len() + self.secrets.len();
        self.windows.retain(|_, w| w.expires_at_ms > now_ms);
        self.secrets
            .retain(|_, s| now_ms.saturating_sub(s.last_used_ms) <= idle_ms);
        before - (self.windows.len() + self.secrets.len())
    }

    #[cfg(test)]
    fn window_len(&self, key: &str) -> usize {
        self.windows.get(key).map(|w| w.entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn admit(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        max: u32,
    ) -> Result<WindowSnapshot, StoreError> {
        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| RateWindow {
                entries: Vec::new(),
                expires_at_ms: 0,
            });

        let cutoff = now_ms.saturating_sub(window_ms);
        window.entries.retain(|&ts| ts > cutoff);
        window.entries.push(now_ms);
        window.expires_at_ms = now_ms + window_ms;

        let total_hits = window.entries.len() as u32;
        let admitted = total_hits <= max;
        if !admitted {
            // Rejected requests must not consume a budget slot.
            window.entries.pop();
        }

        let oldest_ms = window.entries.iter().copied().min().unwrap_or(now_ms);

        Ok(WindowSnapshot {
            admitted,
            total_hits,
            oldest_ms,
        })
    }

    async fn decrement(&self, key: &str) -> Result<(), StoreError> {
        if let Some(mut window) = self.windows.get_mut(key) {
            window.entries.pop();
        }
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.windows.remove(key);
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now_ms();
        Ok(self.secrets.get_mut(session_id).map(|mut entry| {
            entry.last_used_ms = now;
            entry.secret.clone()
        }))
    }

    async fn get_or_create(&self, session_id: &str) -> Result<Vec<u8>, StoreError> {
        let now = self.clock.now_ms();
        let mut entry = self
            .secrets
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let mut secret = vec![0u8; SECRET_LEN];
                rand::thread_rng().fill_bytes(&mut secret);
                SecretEntry {
                    secret,
                    last_used_ms: now,
                }
            });
        entry.last_used_ms = now;
        Ok(entry.secret.clone())
    }
}
