//! Error types for testbed.

use std::sync::Arc;
use thiserror::Error;

/// Errors produced by environments, gateways and service adapters.
///
/// The type is `Clone` so a single cached failure can be handed to every
/// caller waiting on the same resource.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // Configuration errors
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot {operation} environment in state {state}")]
    Lifecycle {
        operation: &'static str,
        state: String,
    },

    // Container errors
    #[error("Container {name} failed to start: {message}")]
    ContainerStart { name: String, message: String },

    #[error("Container {name} failed to stop: {message}")]
    ContainerStop { name: String, message: String },

    #[error("Container {name} does not expose port {port}")]
    PortNotExposed { name: String, port: u16 },

    // Gateway errors
    #[error("Proxy gateway error: {0}")]
    Gateway(String),

    #[error("Proxy gateway has no free listen ports (capacity {capacity})")]
    GatewayExhausted { capacity: usize },

    // Resource errors
    #[error("Provisioning {service} failed: {message}")]
    Provisioning { service: String, message: String },

    #[error("Cached resource {key} has a different type")]
    ResourceTypeMismatch { key: String },

    #[error("Teardown {label} failed: {message}")]
    Teardown { label: String, message: String },

    // Infrastructure errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a provisioning failure of `service`.
    pub fn provisioning(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Provisioning {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error was raised before any I/O happened.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidPort(_) | Error::Configuration(_) | Error::Lifecycle { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
