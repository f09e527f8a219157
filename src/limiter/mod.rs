//! Sliding-window rate limiter.
//!
//! # Data Flow
//! ```text
//! pipeline:
//!     → policy.rs (match route to a policy, derive the limiting key)
//!     → sliding.rs (atomic admit against the window store)
//!     → response headers (RateLimit-*, Retry-After on 429)
//! ```
//!
//! # Design Decisions
//! - Exact, not approximate: rejected requests never consume a slot.
//! - Fail open on store outage. Quota enforcement is worth less than
//!   availability; the degradation is logged and audited.

pub mod policy;
pub mod sliding;

pub use policy::{limit_key, KeyContext, PolicyTable};
pub use sliding::{RateDecision, RateLimiter};
