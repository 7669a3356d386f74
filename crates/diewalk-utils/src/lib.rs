//! # diewalk Utilities
//!
//! Shared utilities, logging, config, and helpers for diewalk.
//!
//! This crate provides the logging setup used by the `diewalk` binary, built
//! on `tracing`.

pub mod logging;

// Re-export commonly used logging items for convenience
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
