//! Clock and shared-store adapter.
//!
//! # Data Flow
//! ```text
//! limiter ──▶ WindowStore::admit / decrement / reset
//! csrf    ──▶ SecretStore::get / get_or_create
//!                 │
//!                 ▼
//!        MemoryStore (single instance)
//!        or any backend with atomic sorted-set + TTL semantics
//! ```
//!
//! # Design Decisions
//! - `admit` is one atomic unit: prune, conditional insert, count,
//!   TTL refresh. Over-admission races are impossible per key.
//! - The store never decides policy; it reports counts and the caller
//!   maps them to allow/deny.

pub mod clock;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryStore;

/// Errors from the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation exceeded its deadline.
    #[error("store operation timed out after {0} ms")]
    Timeout(u64),

    /// Backend rejected or dropped the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an atomic sliding-window admission.
#[derive(Debug, Clone, Copy)]
pub struct WindowSnapshot {
    /// Whether the request's entry was kept in the window.
    pub admitted: bool,

    /// Entries in the window at decision time. For a rejected request
    /// this includes the tentative entry, so it is at most `max + 1`.
    pub total_hits: u32,

    /// Oldest surviving timestamp in the window, in epoch milliseconds.
    pub oldest_ms: u64,
}

/// Atomic sliding-window operations keyed by limiting key.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Prune entries older than `now_ms - window_ms`, tentatively insert
    /// an entry for this request, and keep it only while the window holds
    /// at most `max` entries. Refreshes the key's TTL to ~`window_ms`.
    async fn admit(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        max: u32,
    ) -> Result<WindowSnapshot, StoreError>;

    /// Remove one entry from the window. Entries are fungible for
    /// counting, so the most recent is removed.
    async fn decrement(&self, key: &str) -> Result<(), StoreError>;

    /// Administrative override: clear all entries for a key.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;
}

/// Per-session CSRF secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret for a session, if one exists.
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Fetch the secret for a session, creating it if absent. Creation
    /// is idempotent under concurrent calls.
    async fn get_or_create(&self, session_id: &str) -> Result<Vec<u8>, StoreError>;
}
