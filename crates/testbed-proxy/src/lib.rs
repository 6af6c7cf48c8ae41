//! Fault-injection gateway for testbed.
//!
//! Wraps one Toxiproxy container: every logical service can be fronted by a
//! proxy mapping whose toxics and availability are controlled from tests.

mod client;
pub mod config;
mod gateway;
mod mapping;

pub use client::{ProxyInfo, ToxiproxyClient};
pub use config::GatewayConfig;
pub use gateway::ProxyGateway;
pub use mapping::ProxyMapping;
