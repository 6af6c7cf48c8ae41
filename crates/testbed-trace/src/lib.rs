//! Tracing integration for testbed.
//!
//! Provides the `tracing`-backed logger used by environments, the default
//! container log classifier, and subscriber initialisation.

pub mod format;
pub mod logger;
pub mod subscriber;

pub use format::DefaultLogFormatter;
pub use logger::TracingLogger;
pub use subscriber::{LogFormat, TracingConfig, TracingError, init_test_logging, init_tracing};
