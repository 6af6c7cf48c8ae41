//! Direct or proxied endpoint resolution.

use std::sync::Arc;
use testbed_core::endpoint::ServiceEndpoint;
use testbed_core::port::IntoPort;
use testbed_core::ports::ProxyGatewayPort;
use testbed_core::Result;
use tracing::debug;

/// Decides how a logical service is reached.
///
/// With fault injection enabled and a gateway present, every resolution
/// creates a gateway mapping in front of `internal_host:port`; otherwise the
/// upstream coordinates are returned as they are.
#[derive(Clone)]
pub struct EndpointResolver {
    internal_host: String,
    fault_injection: bool,
    gateway: Option<Arc<dyn ProxyGatewayPort>>,
}

impl EndpointResolver {
    pub fn new(
        internal_host: impl Into<String>,
        fault_injection: bool,
        gateway: Option<Arc<dyn ProxyGatewayPort>>,
    ) -> Self {
        Self {
            internal_host: internal_host.into(),
            fault_injection,
            gateway,
        }
    }

    /// Resolver that never proxies.
    pub fn direct(internal_host: impl Into<String>) -> Self {
        Self::new(internal_host, false, None)
    }

    pub fn internal_host(&self) -> &str {
        &self.internal_host
    }

    pub fn is_proxying(&self) -> bool {
        self.fault_injection && self.gateway.is_some()
    }

    /// Resolve `logical_name` listening on `port` of the internal host.
    ///
    /// The port is validated before any gateway call is made.
    pub async fn resolve<P: IntoPort>(&self, logical_name: &str, port: P) -> Result<ServiceEndpoint> {
        let port = port.into_port()?;

        match (&self.gateway, self.fault_injection) {
            (Some(gateway), true) => {
                let upstream = format!("{}:{}", self.internal_host, port);
                debug!(service = %logical_name, upstream = %upstream, "Resolving through gateway");
                gateway.create_mapping(logical_name, &upstream).await
            }
            _ => {
                debug!(service = %logical_name, port, "Resolving directly");
                Ok(ServiceEndpoint::direct(self.internal_host.clone(), port))
            }
        }
    }
}

impl std::fmt::Debug for EndpointResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointResolver")
            .field("internal_host", &self.internal_host)
            .field("fault_injection", &self.fault_injection)
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_core::testing::StaticGateway;
    use testbed_core::Error;

    #[tokio::test]
    async fn test_direct_when_not_proxied() {
        let resolver = EndpointResolver::direct("10.0.0.1");
        let endpoint = resolver.resolve("postgres", 5432u16).await.unwrap();
        assert_eq!(endpoint, ServiceEndpoint::direct("10.0.0.1", 5432));
        assert!(endpoint.controls().is_none());
    }

    #[tokio::test]
    async fn test_proxied_when_gateway_present() {
        let gateway = Arc::new(StaticGateway::new("10.0.0.1"));
        let resolver = EndpointResolver::new("10.0.0.1", true, Some(gateway.clone()));

        let endpoint = resolver.resolve("svc", 1234).await.unwrap();
        assert!(endpoint.is_proxied());
        assert_eq!(endpoint.host(), "10.0.0.1");
        assert_ne!(endpoint.port(), 1234);
        assert!(endpoint.controls().is_some());
        assert_eq!(
            gateway.mappings(),
            vec![("svc".to_string(), "10.0.0.1:1234".to_string())]
        );
    }

    #[tokio::test]
    async fn test_gateway_ignored_when_fault_injection_disabled() {
        let gateway = Arc::new(StaticGateway::new("10.0.0.1"));
        let resolver = EndpointResolver::new("10.0.0.1", false, Some(gateway.clone()));

        let endpoint = resolver.resolve("svc", 1234).await.unwrap();
        assert!(!endpoint.is_proxied());
        assert!(gateway.mappings().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_port_fails_before_gateway_call() {
        let gateway = Arc::new(StaticGateway::new("10.0.0.1"));
        let resolver = EndpointResolver::new("10.0.0.1", true, Some(gateway.clone()));

        for result in [
            resolver.resolve("svc", "not-a-number").await,
            resolver.resolve("svc", 0).await,
            resolver.resolve("svc", -8080).await,
        ] {
            assert!(matches!(result, Err(Error::InvalidPort(_))));
        }
        assert!(gateway.mappings().is_empty());
    }
}
