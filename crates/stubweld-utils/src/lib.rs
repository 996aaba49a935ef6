//! # stubweld Utilities
//!
//! Shared utilities and logging for stubweld.
//!
//! The pipeline itself only emits `tracing` events; this crate decides where
//! they end up.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
