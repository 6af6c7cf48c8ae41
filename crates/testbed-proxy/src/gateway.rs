//! The proxy gateway: one Toxiproxy container fronting many services.

use crate::client::ToxiproxyClient;
use crate::config::{CONTROL_PORT, GatewayConfig, HOST_GATEWAY_ALIAS};
use crate::mapping::ProxyMapping;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use testbed_core::endpoint::ServiceEndpoint;
use testbed_core::ports::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ProxyGatewayPort, ReadyCondition,
    SharedContainer,
};
use testbed_core::{Error, Result};
use tokio::sync::Mutex;
use tracing::info;

/// A running fault-injection gateway.
///
/// Each mapping takes the next free listen port from the pool; the
/// endpoint it returns points at the host port that listen port is
/// published on, so callers reach the gateway rather than the upstream.
/// A port goes back to the pool when Toxiproxy rejects the mapping.
#[derive(Debug)]
pub struct ProxyGateway {
    client: ToxiproxyClient,
    internal_host: String,
    capacity: usize,
    /// Unused `(container listen port, published host port)` pairs.
    free_ports: Mutex<VecDeque<(u16, u16)>>,
    mappings: Mutex<Vec<String>>,
}

impl ProxyGateway {
    /// Start the gateway container and wait until its API answers.
    ///
    /// Returns the gateway and the container handle; stopping the handle
    /// stops the gateway.
    pub async fn start(
        runtime: &dyn ContainerRuntime,
        config: GatewayConfig,
    ) -> Result<(Arc<Self>, SharedContainer)> {
        let container = Self::launch(runtime, &config).await?;
        let gateway = Self::connect(container.as_ref(), config).await?;
        Ok((gateway, container))
    }

    /// Start the gateway container without talking to it.
    pub async fn launch(
        runtime: &dyn ContainerRuntime,
        config: &GatewayConfig,
    ) -> Result<SharedContainer> {
        info!(image = %config.image, name = %config.container_name, "Starting proxy gateway");

        let mut spec = ContainerSpec::new(config.container_name.clone(), &config.image)
            .with_exposed_port(CONTROL_PORT)
            .with_host_gateway_alias(HOST_GATEWAY_ALIAS)
            .with_ready(ReadyCondition::Http {
                port: CONTROL_PORT,
                path: "/version".to_string(),
            });
        for port in &config.listen_ports {
            spec = spec.with_exposed_port(*port);
        }
        if let Some(sink) = config.log_sink.clone() {
            spec = spec.with_log_sink(sink);
        }

        runtime.start(spec).await
    }

    /// Attach to a launched gateway container and check that its API
    /// answers.
    pub async fn connect(
        container: &dyn ContainerHandle,
        config: GatewayConfig,
    ) -> Result<Arc<Self>> {
        let control_port = container.host_port(CONTROL_PORT)?;
        let listen_ports = config
            .listen_ports
            .iter()
            .map(|port| container.host_port(*port).map(|host| (*port, host)))
            .collect::<Result<Vec<_>>>()?;

        let client = ToxiproxyClient::new(format!(
            "http://{}:{}",
            config.internal_host, control_port
        ));
        let version = client.version().await?;
        info!(version = %version, control = %client.base_url(), "Proxy gateway ready");

        Ok(Arc::new(Self::with_client(
            client,
            config.internal_host,
            listen_ports,
        )))
    }

    /// Build a gateway around an already running Toxiproxy server.
    pub fn with_client(
        client: ToxiproxyClient,
        internal_host: impl Into<String>,
        listen_ports: Vec<(u16, u16)>,
    ) -> Self {
        Self {
            client,
            internal_host: internal_host.into(),
            capacity: listen_ports.len(),
            free_ports: Mutex::new(listen_ports.into()),
            mappings: Mutex::new(Vec::new()),
        }
    }

    pub fn control_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn client(&self) -> &ToxiproxyClient {
        &self.client
    }

    /// Number of listen ports in the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn mapping_count(&self) -> usize {
        self.mappings.lock().await.len()
    }

    /// Names of the mappings created so far, in creation order.
    pub async fn mapping_names(&self) -> Vec<String> {
        self.mappings.lock().await.clone()
    }

    /// Remove every toxic and re-enable every mapping.
    pub async fn reset(&self) -> Result<()> {
        info!("Resetting proxy gateway");
        self.client.reset().await
    }

    /// Front `upstream` (`host:port`) with a new mapping named
    /// `logical_name`.
    pub async fn create_mapping(
        &self,
        logical_name: &str,
        upstream: &str,
    ) -> Result<ServiceEndpoint> {
        let (listen_port, host_port) = self
            .free_ports
            .lock()
            .await
            .pop_front()
            .ok_or(Error::GatewayExhausted {
                capacity: self.capacity,
            })?;

        let upstream = gateway_upstream(upstream);
        if let Err(e) = self
            .client
            .create_proxy(logical_name, &format!("0.0.0.0:{}", listen_port), &upstream)
            .await
        {
            self.free_ports
                .lock()
                .await
                .push_front((listen_port, host_port));
            return Err(e);
        }
        self.mappings.lock().await.push(logical_name.to_string());

        info!(
            name = %logical_name,
            upstream = %upstream,
            port = host_port,
            "Created proxy mapping"
        );

        let controls = Arc::new(ProxyMapping::new(self.client.clone(), logical_name));
        Ok(ServiceEndpoint::proxied(
            self.internal_host.clone(),
            host_port,
            controls,
        ))
    }
}

/// Rewrite a loopback upstream so the gateway container dials the Docker
/// host instead of itself.
fn gateway_upstream(upstream: &str) -> String {
    let Some((host, port)) = upstream.rsplit_once(':') else {
        return upstream.to_string();
    };
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let loopback = bare.eq_ignore_ascii_case("localhost")
        || bare.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback());
    if loopback {
        format!("{HOST_GATEWAY_ALIAS}:{port}")
    } else {
        upstream.to_string()
    }
}

#[async_trait]
impl ProxyGatewayPort for ProxyGateway {
    async fn create_mapping(&self, logical_name: &str, upstream: &str) -> Result<ServiceEndpoint> {
        ProxyGateway::create_mapping(self, logical_name, upstream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use testbed_core::testing::FakeRuntime;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_toxiproxy() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/proxies"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "svc",
                "listen": "0.0.0.0:8666",
                "upstream": "10.0.0.1:1234",
                "enabled": true
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_mapping_uses_published_listen_port() {
        let server = mock_toxiproxy().await;
        let gateway = ProxyGateway::with_client(
            ToxiproxyClient::new(server.uri()),
            "10.0.0.1",
            vec![(8666, 32001), (8667, 32002)],
        );

        let first = gateway.create_mapping("postgres", "10.0.0.1:5432").await.unwrap();
        let second = gateway.create_mapping("redis", "10.0.0.1:6379").await.unwrap();

        assert!(first.is_proxied());
        assert_eq!(first.host(), "10.0.0.1");
        assert_eq!(first.port(), 32001);
        assert_eq!(second.port(), 32002);
        assert_eq!(
            gateway.mapping_names().await,
            vec!["postgres".to_string(), "redis".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exhausted_pool() {
        let server = mock_toxiproxy().await;
        let gateway = ProxyGateway::with_client(
            ToxiproxyClient::new(server.uri()),
            "10.0.0.1",
            vec![(8666, 32001)],
        );

        gateway.create_mapping("a", "10.0.0.1:1").await.unwrap();
        let err = gateway.create_mapping("b", "10.0.0.1:2").await.unwrap_err();
        assert!(matches!(err, Error::GatewayExhausted { capacity: 1 }));
    }

    #[tokio::test]
    async fn test_rejected_mapping_frees_its_port() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/proxies"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/proxies"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "redis",
                "listen": "0.0.0.0:8666",
                "upstream": "10.0.0.1:6379",
                "enabled": true
            })))
            .mount(&server)
            .await;

        let gateway = ProxyGateway::with_client(
            ToxiproxyClient::new(server.uri()),
            "10.0.0.1",
            vec![(8666, 32001)],
        );

        let err = gateway.create_mapping("redis", "10.0.0.1:6379").await.unwrap_err();
        assert!(matches!(err, Error::Gateway(_)));
        assert_eq!(gateway.mapping_count().await, 0);

        let endpoint = gateway.create_mapping("redis", "10.0.0.1:6379").await.unwrap();
        assert_eq!(endpoint.port(), 32001);
        assert_eq!(gateway.mapping_count().await, 1);
    }

    #[tokio::test]
    async fn test_loopback_upstream_goes_through_docker_host() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/proxies"))
            .and(body_partial_json(json!({"upstream": "host.docker.internal:5432"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "postgres",
                "listen": "0.0.0.0:8666",
                "upstream": "host.docker.internal:5432",
                "enabled": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = ProxyGateway::with_client(
            ToxiproxyClient::new(server.uri()),
            "127.0.0.1",
            vec![(8666, 32001)],
        );

        let endpoint = gateway.create_mapping("postgres", "127.0.0.1:5432").await.unwrap();
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 32001);
    }

    #[test]
    fn test_gateway_upstream() {
        assert_eq!(gateway_upstream("127.0.0.1:5432"), "host.docker.internal:5432");
        assert_eq!(gateway_upstream("localhost:6379"), "host.docker.internal:6379");
        assert_eq!(gateway_upstream("[::1]:9000"), "host.docker.internal:9000");
        assert_eq!(gateway_upstream("10.0.0.1:5432"), "10.0.0.1:5432");
        assert_eq!(gateway_upstream("postgres:5432"), "postgres:5432");
    }

    #[tokio::test]
    async fn test_start_publishes_control_and_listen_ports() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2.9.0\n"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/proxies"))
            .and(body_partial_json(json!({"listen": "0.0.0.0:8666"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "postgres",
                "listen": "0.0.0.0:8666",
                "upstream": "127.0.0.1:5432",
                "enabled": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let runtime = FakeRuntime::new();
        runtime.publish_port(CONTROL_PORT, server.address().port());
        runtime.publish_port(8666, 31000);

        let config = GatewayConfig::new("127.0.0.1", "env-gateway").with_listen_ports([8666]);
        let (gateway, container) = ProxyGateway::start(&runtime, config).await.unwrap();

        assert_eq!(container.name(), "env-gateway");
        assert_eq!(gateway.control_url(), server.uri());

        let specs = runtime.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].image_ref(), "ghcr.io/shopify/toxiproxy:2.9.0");
        assert_eq!(specs[0].exposed_ports, vec![CONTROL_PORT, 8666]);
        assert_eq!(specs[0].host_gateway_aliases, vec![HOST_GATEWAY_ALIAS.to_string()]);
        assert_eq!(
            specs[0].ready,
            ReadyCondition::Http {
                port: CONTROL_PORT,
                path: "/version".into()
            }
        );

        let endpoint = gateway
            .create_mapping("postgres", "127.0.0.1:5432")
            .await
            .unwrap();
        assert_eq!(endpoint.port(), 31000);
        assert!(endpoint.controls().is_some());
    }

    #[tokio::test]
    async fn test_connect_fails_when_api_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let runtime = FakeRuntime::new();
        runtime.publish_port(CONTROL_PORT, server.address().port());
        let config = GatewayConfig::new("127.0.0.1", "env-gateway").with_listen_ports([8666]);

        let container = ProxyGateway::launch(&runtime, &config).await.unwrap();
        let err = ProxyGateway::connect(container.as_ref(), config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Gateway(_)));
        assert_eq!(runtime.started().len(), 1);
    }
}
