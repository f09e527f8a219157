//! Request-security middleware core.
//!
//! Protects state-changing HTTP requests from cross-site forgery, enforces
//! per-key sliding-window rate budgets, and maintains a live risk model of
//! clients that auto-blocks abusive IPs.
//!
//! # Architecture Overview
//!
//! ```text
//!  Inbound request
//!      │
//!      ▼
//!  ┌──────────────────── pipeline ─────────────────────┐
//!  │ IP-block gate → classify+audit → CSRF → limiter   │───▶ handler
//!  └───────────────────────────────────────────────────┘       │
//!      │ reject: 403/429 JSON {error, code}                    ▼
//!      ▼                                            completion hook
//!  audit sink ◀── SecurityEvent stream ◀── (post-hoc decrement,
//!                                           failed-login tracking)
//!
//!  Cross-cutting: config (TOML + hot-swap), store adapter (clock +
//!  atomic window/secret ops), observability (tracing + metrics),
//!  lifecycle (shutdown broadcast, background sweep).
//! ```

// Core subsystems
pub mod config;
pub mod csrf;
pub mod limiter;
pub mod pipeline;
pub mod risk;
pub mod store;

// Cross-cutting concerns
pub mod audit;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GuardConfig;
pub use error::GuardError;
pub use lifecycle::Shutdown;
pub use pipeline::{guard_middleware, GuardState};
