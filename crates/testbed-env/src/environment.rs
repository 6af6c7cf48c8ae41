//! The environment state machine.

use crate::cleanup::CleanupRegistry;
use crate::context::ServiceContext;
use crate::log_stream::ContainerLogForwarder;
use crate::resolver::EndpointResolver;
use crate::resources::ResourceCache;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use testbed_core::ports::{
    ContainerRuntime, ContainerSpec, LogFormatter, LogSink, NoopLogger, ProxyGatewayPort,
    SharedContainer, SharedLogger, StopOptions,
};
use testbed_core::{
    EnvironmentConfig, EnvironmentId, EnvironmentVariables, Error, IntoPort, Result,
    ServiceEndpoint, ServiceSettings,
};
use testbed_proxy::{GatewayConfig, ProxyGateway};
use testbed_trace::DefaultLogFormatter;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Environment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Starting,
    Started,
    StartFailed,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Started => "started",
            LifecycleState::StartFailed => "start_failed",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Handles available to an [`ApplicationStack`] while it starts.
pub struct StartContext {
    id: EnvironmentId,
    internal_host: String,
    runtime: Arc<dyn ContainerRuntime>,
    logger: SharedLogger,
    formatter: Arc<dyn LogFormatter>,
    containers: Arc<Mutex<Vec<SharedContainer>>>,
    variables: EnvironmentVariables,
}

impl StartContext {
    pub fn id(&self) -> &EnvironmentId {
        &self.id
    }

    pub fn internal_host(&self) -> &str {
        &self.internal_host
    }

    /// Variables the environment was built with.
    pub fn variables(&self) -> &EnvironmentVariables {
        &self.variables
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    /// Container name for `service`, unique to this environment.
    pub fn container_name(&self, service: &str) -> String {
        format!("{}-{}", self.id.slug(), service)
    }

    /// Sink forwarding a container's output to the environment logger.
    pub fn log_sink(&self, container_name: &str) -> Arc<dyn LogSink> {
        Arc::new(
            ContainerLogForwarder::new(
                container_name,
                self.formatter.clone(),
                self.logger.clone(),
            )
            .with_environment_id(self.id.as_str()),
        )
    }

    /// Start a container owned by the environment.
    ///
    /// The container is stopped by [`Environment::stop`] even if the rest
    /// of the start sequence fails.
    pub async fn start_container(&self, spec: ContainerSpec) -> Result<SharedContainer> {
        let spec = if spec.log_sink.is_some() {
            spec
        } else {
            let sink = self.log_sink(&spec.name);
            spec.with_log_sink(sink)
        };
        let container = self.runtime.start(spec).await?;
        self.containers.lock().await.push(container.clone());
        Ok(container)
    }
}

impl fmt::Debug for StartContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartContext")
            .field("id", &self.id)
            .field("internal_host", &self.internal_host)
            .finish_non_exhaustive()
    }
}

/// Starts the containers an environment is made of.
///
/// Returned variables are layered over the environment's base variables
/// and become part of its frozen snapshot.
#[async_trait]
pub trait ApplicationStack: Send + Sync {
    async fn start(&self, ctx: &StartContext) -> Result<EnvironmentVariables>;
}

/// Stack with no containers of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoApplication;

#[async_trait]
impl ApplicationStack for NoApplication {
    async fn start(&self, _ctx: &StartContext) -> Result<EnvironmentVariables> {
        Ok(EnvironmentVariables::new())
    }
}

/// Builder for [`Environment`].
pub struct EnvironmentBuilder {
    config: EnvironmentConfig,
    logger: SharedLogger,
    formatter: Arc<dyn LogFormatter>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    application: Option<Arc<dyn ApplicationStack>>,
    variables: EnvironmentVariables,
}

impl EnvironmentBuilder {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            config,
            logger: Arc::new(NoopLogger),
            formatter: Arc::new(DefaultLogFormatter),
            runtime: None,
            application: None,
            variables: EnvironmentVariables::new(),
        }
    }

    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn formatter(mut self, formatter: Arc<dyn LogFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn application(mut self, application: Arc<dyn ApplicationStack>) -> Self {
        self.application = Some(application);
        self
    }

    /// Base variables, usually [`EnvironmentVariables::from_process`].
    pub fn variables(mut self, variables: EnvironmentVariables) -> Self {
        self.variables = variables;
        self
    }

    pub fn build(self) -> Result<Environment> {
        self.config.validate()?;
        let runtime = self
            .runtime
            .ok_or_else(|| Error::Configuration("a container runtime is required".into()))?;
        let application = self
            .application
            .ok_or_else(|| Error::Configuration("an application stack is required".into()))?;
        let settings = ServiceSettings::from_variables(&self.variables)?;

        let id = self
            .config
            .id
            .clone()
            .map(EnvironmentId::new)
            .unwrap_or_else(EnvironmentId::generate);

        Ok(Environment {
            id,
            config: self.config,
            logger: self.logger,
            formatter: self.formatter,
            runtime,
            application,
            base_variables: Arc::new(self.variables),
            base_settings: Arc::new(settings),
            state: StdMutex::new(LifecycleState::Created),
            gateway: OnceLock::new(),
            snapshot: OnceLock::new(),
            containers: Arc::new(Mutex::new(Vec::new())),
            cache: ResourceCache::new(),
            cleanup: CleanupRegistry::new(),
        })
    }
}

/// An ephemeral set of containers plus the resources provisioned in them.
///
/// `start` and `stop` may each be called once; see [`LifecycleState`].
pub struct Environment {
    id: EnvironmentId,
    config: EnvironmentConfig,
    logger: SharedLogger,
    formatter: Arc<dyn LogFormatter>,
    runtime: Arc<dyn ContainerRuntime>,
    application: Arc<dyn ApplicationStack>,
    base_variables: Arc<EnvironmentVariables>,
    base_settings: Arc<ServiceSettings>,
    state: StdMutex<LifecycleState>,
    gateway: OnceLock<Arc<ProxyGateway>>,
    /// Variables and settings frozen after the application stack started.
    snapshot: OnceLock<(Arc<EnvironmentVariables>, Arc<ServiceSettings>)>,
    containers: Arc<Mutex<Vec<SharedContainer>>>,
    cache: ResourceCache,
    cleanup: CleanupRegistry,
}

impl Environment {
    pub fn builder(config: EnvironmentConfig) -> EnvironmentBuilder {
        EnvironmentBuilder::new(config)
    }

    pub fn id(&self) -> &EnvironmentId {
        &self.id
    }

    pub fn internal_host(&self) -> &str {
        &self.config.internal_host
    }

    pub fn is_proxied(&self) -> bool {
        self.config.proxied
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    /// The fault-injection gateway, once started.
    pub fn gateway(&self) -> Option<&Arc<ProxyGateway>> {
        self.gateway.get()
    }

    /// Base variables before start, the frozen snapshot afterwards.
    pub fn variables(&self) -> &EnvironmentVariables {
        match self.snapshot.get() {
            Some((variables, _)) => variables,
            None => &self.base_variables,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        match self.snapshot.get() {
            Some((_, settings)) => settings,
            None => &self.base_settings,
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn cleanup(&self) -> &CleanupRegistry {
        &self.cleanup
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    pub async fn container_count(&self) -> usize {
        self.containers.lock().await.len()
    }

    /// Resolver reflecting the current gateway.
    pub fn resolver(&self) -> EndpointResolver {
        let gateway = self
            .gateway
            .get()
            .map(|gateway| gateway.clone() as Arc<dyn ProxyGatewayPort>);
        EndpointResolver::new(self.internal_host(), self.config.proxied, gateway)
    }

    pub async fn resolve<P: IntoPort>(&self, logical_name: &str, port: P) -> Result<ServiceEndpoint> {
        self.resolver().resolve(logical_name, port).await
    }

    /// Context for backing-service adapters. Requires a started environment.
    pub fn service_context(&self) -> Result<ServiceContext> {
        let state = self.state();
        if state != LifecycleState::Started {
            return Err(Error::Lifecycle {
                operation: "provision resources in",
                state: state.to_string(),
            });
        }

        Ok(ServiceContext::new(
            self.id.clone(),
            self.resolver(),
            self.variables().clone(),
            self.settings().clone(),
        )
        .with_shared(
            self.cache.clone(),
            self.cleanup.clone(),
            self.logger.clone(),
        ))
    }

    /// Start the gateway (when proxied) and then the application stack.
    ///
    /// A failure leaves the environment in [`LifecycleState::StartFailed`];
    /// containers started so far are released by [`stop`](Self::stop).
    pub async fn start(&self) -> Result<()> {
        self.transition("start", &[LifecycleState::Created], LifecycleState::Starting)?;
        info!(env = %self.id, proxied = self.config.proxied, "Starting environment");

        match self.start_inner().await {
            Ok(()) => {
                self.set_state(LifecycleState::Started);
                info!(env = %self.id, "Environment started");
                Ok(())
            }
            Err(e) => {
                self.set_state(LifecycleState::StartFailed);
                error!(env = %self.id, error = %e, "Environment failed to start");
                self.logger.error(json!({
                    "msg": "Environment failed to start",
                    "environmentId": self.id.as_str(),
                    "error": e.to_string(),
                }));
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        let ctx = StartContext {
            id: self.id.clone(),
            internal_host: self.config.internal_host.clone(),
            runtime: self.runtime.clone(),
            logger: self.logger.clone(),
            formatter: self.formatter.clone(),
            containers: self.containers.clone(),
            variables: (*self.base_variables).clone(),
        };

        if self.config.proxied {
            let name = ctx.container_name("toxiproxy");
            let config = GatewayConfig::new(self.internal_host(), name.clone())
                .with_image(self.config.proxy_image.clone())
                .with_log_sink(ctx.log_sink(&name));
            let container = ProxyGateway::launch(self.runtime.as_ref(), &config).await?;
            self.containers.lock().await.push(container.clone());

            let gateway = ProxyGateway::connect(container.as_ref(), config).await?;
            // Only reachable from Starting, so the cell is empty.
            let _ = self.gateway.set(gateway);
        }

        let published = self.application.start(&ctx).await?;
        let variables = self.base_variables.merged(&published);
        let settings = ServiceSettings::from_variables(&variables)?;
        let _ = self
            .snapshot
            .set((Arc::new(variables), Arc::new(settings)));
        Ok(())
    }

    /// Tear the environment down.
    ///
    /// Runs every registered cleanup in registration order, clears the
    /// resource cache, then stops all containers concurrently. Cleanup
    /// failures are only logged; the first container stop failure is
    /// returned after every container has been asked to stop.
    pub async fn stop(&self) -> Result<()> {
        self.transition(
            "stop",
            &[LifecycleState::Started, LifecycleState::StartFailed],
            LifecycleState::Stopping,
        )?;
        info!(env = %self.id, "Stopping environment");

        self.cleanup.close();
        let report = self.cleanup.run_all(self.logger.as_ref()).await;
        if !report.is_clean() {
            warn!(
                env = %self.id,
                failed = report.failures.len(),
                attempted = report.attempted(),
                "Some cleanups failed"
            );
        }

        self.cache.clear().await;

        let containers = std::mem::take(&mut *self.containers.lock().await);
        let mut stops: FuturesUnordered<_> = containers
            .iter()
            .map(|container| async move {
                let result = container.stop(StopOptions::default()).await;
                (container.name().to_string(), result)
            })
            .collect();

        let mut first_failure = None;
        while let Some((name, result)) = stops.next().await {
            if let Err(e) = result {
                warn!(env = %self.id, container = %name, error = %e, "Failed to stop container");
                self.logger.error(json!({
                    "msg": "Failed to stop container",
                    "container": name,
                    "environmentId": self.id.as_str(),
                    "error": e.to_string(),
                }));
                first_failure.get_or_insert(e);
            }
        }

        self.set_state(LifecycleState::Stopped);
        match first_failure {
            Some(e) => Err(e),
            None => {
                info!(env = %self.id, containers = containers.len(), "Environment stopped");
                Ok(())
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LifecycleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: LifecycleState) {
        *self.lock_state() = next;
    }

    fn transition(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
        next: LifecycleState,
    ) -> Result<()> {
        let mut state = self.lock_state();
        if !allowed.contains(&*state) {
            return Err(Error::Lifecycle {
                operation,
                state: state.to_string(),
            });
        }
        *state = next;
        Ok(())
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("internal_host", &self.config.internal_host)
            .field("proxied", &self.config.proxied)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
