//! Configuration for the proxy gateway.

use std::ops::RangeInclusive;
use std::sync::Arc;
use testbed_core::config::DEFAULT_PROXY_IMAGE;
use testbed_core::ports::LogSink;

/// Port of the Toxiproxy control API inside the container.
pub const CONTROL_PORT: u16 = 8474;

/// Name under which the gateway container reaches the Docker host.
pub const HOST_GATEWAY_ALIAS: &str = "host.docker.internal";

/// Container ports handed out to proxy mappings.
pub const LISTEN_PORTS: RangeInclusive<u16> = 8666..=8697;

/// Configuration for starting a [`ProxyGateway`](crate::ProxyGateway).
#[derive(Clone)]
pub struct GatewayConfig {
    /// Gateway image reference.
    pub image: String,
    /// Host at which the gateway's mapped ports are reached.
    pub internal_host: String,
    /// Container name.
    pub container_name: String,
    /// Receiver of the gateway container's output.
    pub log_sink: Option<Arc<dyn LogSink>>,
    /// Container ports available to mappings.
    pub listen_ports: Vec<u16>,
}

impl GatewayConfig {
    pub fn new(internal_host: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            image: DEFAULT_PROXY_IMAGE.to_string(),
            internal_host: internal_host.into(),
            container_name: container_name.into(),
            log_sink: None,
            listen_ports: LISTEN_PORTS.collect(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Restrict the pool of listen ports.
    pub fn with_listen_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.listen_ports = ports.into_iter().collect();
        self
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("image", &self.image)
            .field("internal_host", &self.internal_host)
            .field("container_name", &self.container_name)
            .field("listen_ports", &self.listen_ports.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool() {
        let config = GatewayConfig::new("10.0.0.1", "gw");
        assert_eq!(config.listen_ports.len(), 32);
        assert_eq!(config.listen_ports.first(), Some(&8666));
        assert_eq!(config.image, DEFAULT_PROXY_IMAGE);
    }
}
