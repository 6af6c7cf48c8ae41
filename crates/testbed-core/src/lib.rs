//! Testbed Core
//!
//! Shared vocabulary for testbed environments: errors, identifiers,
//! service endpoints and the port traits implemented by the runtime,
//! logging and proxy crates.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod ids;
pub mod port;
pub mod ports;
pub mod toxic;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{EnvironmentConfig, EnvironmentVariables, ServiceSettings};
pub use endpoint::{FaultControls, ServiceEndpoint};
pub use error::{Error, Result};
pub use ids::EnvironmentId;
pub use port::{IntoPort, validate_port};
pub use toxic::{Toxic, ToxicDirection, ToxicKind};
