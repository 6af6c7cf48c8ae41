//! [`ContainerRuntime`] on top of the local Docker daemon.

use crate::logs::SinkLogConsumer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use testbed_core::ports::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ReadyCondition, SharedContainer, StopOptions,
};
use testbed_core::{Error, Result};
use testcontainers::core::wait::HttpWaitStrategy;
use testcontainers::core::{Host, IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ContainerRequest, GenericImage, ImageExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Starts containers through `testcontainers`.
#[derive(Debug, Clone, Default)]
pub struct TestcontainersRuntime {
    startup_timeout: Option<Duration>,
}

impl TestcontainersRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail a start whose readiness condition is not met within `timeout`.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    fn wait_for(ready: &ReadyCondition) -> WaitFor {
        match ready {
            ReadyCondition::Started => WaitFor::Nothing,
            ReadyCondition::StdoutMessage(message) => WaitFor::message_on_stdout(message.clone()),
            ReadyCondition::StderrMessage(message) => WaitFor::message_on_stderr(message.clone()),
            ReadyCondition::Http { port, path } => WaitFor::http(
                HttpWaitStrategy::new(path.clone())
                    .with_port(port.tcp())
                    .with_expected_status_code(200u16),
            ),
        }
    }

    fn request(&self, spec: &ContainerSpec) -> ContainerRequest<GenericImage> {
        let mut image = GenericImage::new(spec.image.clone(), spec.tag.clone())
            .with_wait_for(Self::wait_for(&spec.ready));
        for port in &spec.exposed_ports {
            image = image.with_exposed_port(port.tcp());
        }

        let mut request = image.with_container_name(spec.name.clone());
        for (key, value) in &spec.env {
            request = request.with_env_var(key.clone(), value.clone());
        }
        if !spec.cmd.is_empty() {
            request = request.with_cmd(spec.cmd.clone());
        }
        if let Some(network) = &spec.network {
            request = request.with_network(network.clone());
        }
        for alias in &spec.host_gateway_aliases {
            request = request.with_host(alias.clone(), Host::HostGateway);
        }
        if let Some(sink) = &spec.log_sink {
            request = request.with_log_consumer(SinkLogConsumer::new(sink.clone()));
        }
        if let Some(timeout) = self.startup_timeout {
            request = request.with_startup_timeout(timeout);
        }
        request
    }
}

#[async_trait]
impl ContainerRuntime for TestcontainersRuntime {
    async fn start(&self, spec: ContainerSpec) -> Result<SharedContainer> {
        info!(name = %spec.name, image = %spec.image_ref(), "Starting container");

        let start_error = |e: testcontainers::TestcontainersError| Error::ContainerStart {
            name: spec.name.clone(),
            message: e.to_string(),
        };

        let container = self.request(&spec).start().await.map_err(start_error)?;

        let mut ports = HashMap::new();
        for port in &spec.exposed_ports {
            let host_port = container
                .get_host_port_ipv4(port.tcp())
                .await
                .map_err(start_error)?;
            ports.insert(*port, host_port);
        }

        debug!(name = %spec.name, id = %container.id(), ports = ?ports, "Container ready");
        Ok(Arc::new(TestcontainersHandle {
            name: spec.name,
            ports,
            container: Mutex::new(Some(container)),
        }))
    }
}

/// A container started by [`TestcontainersRuntime`].
pub struct TestcontainersHandle {
    name: String,
    ports: HashMap<u16, u16>,
    container: Mutex<Option<ContainerAsync<GenericImage>>>,
}

impl TestcontainersHandle {
    pub async fn is_running(&self) -> bool {
        self.container.lock().await.is_some()
    }
}

#[async_trait]
impl ContainerHandle for TestcontainersHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn host_port(&self, container_port: u16) -> Result<u16> {
        self.ports
            .get(&container_port)
            .copied()
            .ok_or_else(|| Error::PortNotExposed {
                name: self.name.clone(),
                port: container_port,
            })
    }

    /// Stop the container. Removal always takes its anonymous volumes with
    /// it; a container stopped without removal is removed when the handle
    /// is dropped.
    async fn stop(&self, options: StopOptions) -> Result<()> {
        let mut slot = self.container.lock().await;
        let Some(container) = slot.take() else {
            debug!(name = %self.name, "Container already stopped");
            return Ok(());
        };

        let stop_error = |e: testcontainers::TestcontainersError| Error::ContainerStop {
            name: self.name.clone(),
            message: e.to_string(),
        };

        info!(name = %self.name, remove = options.remove, "Stopping container");
        if options.remove {
            container.rm().await.map_err(stop_error)
        } else {
            let result = container.stop().await.map_err(stop_error);
            *slot = Some(container);
            result
        }
    }
}

impl std::fmt::Debug for TestcontainersHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestcontainersHandle")
            .field("name", &self.name)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}
