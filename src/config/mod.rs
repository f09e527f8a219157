//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file → loader.rs → validation.rs → GuardConfig
//!                                             │
//!                              ArcSwap handle held by the pipeline
//!                              (snapshot per request, swappable live)
//! ```

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::GuardConfig;
