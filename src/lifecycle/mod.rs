//! Lifecycle management: startup ordering and graceful shutdown.

pub mod shutdown;

pub use shutdown::Shutdown;
