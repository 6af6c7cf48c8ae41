//! Starts a selection of catalogue services for an environment.

use crate::catalogue::ServiceKind;
use async_trait::async_trait;
use futures::future::try_join_all;
use testbed_core::{EnvironmentVariables, Result, ServiceSettings};
use testbed_env::{ApplicationStack, StartContext};
use tracing::info;

/// [`ApplicationStack`] made of backing services from the catalogue.
///
/// Services start concurrently. Each mapped host port is published as
/// `TESTBED_<SERVICE>__<FIELD>`, so adapters built from the environment's
/// settings connect to the started containers.
#[derive(Debug, Clone, Default)]
pub struct ServiceStack {
    services: Vec<ServiceKind>,
}

impl ServiceStack {
    pub fn new(services: impl IntoIterator<Item = ServiceKind>) -> Self {
        let mut stack = Self::default();
        for service in services {
            stack = stack.with(service);
        }
        stack
    }

    /// Every service in the catalogue.
    pub fn all() -> Self {
        Self::new(ServiceKind::ALL)
    }

    pub fn with(mut self, service: ServiceKind) -> Self {
        if !self.services.contains(&service) {
            self.services.push(service);
        }
        self
    }

    pub fn services(&self) -> &[ServiceKind] {
        &self.services
    }

    async fn start_service(
        ctx: &StartContext,
        settings: &ServiceSettings,
        service: ServiceKind,
    ) -> Result<Vec<(String, String)>> {
        let name = ctx.container_name(service.name());
        let container = ctx
            .start_container(service.container_spec(&name, settings))
            .await?;

        let mut published = Vec::new();
        for port in service.published_ports() {
            let host_port = container.host_port(port.container_port)?;
            info!(
                service = %service,
                container_port = port.container_port,
                host_port,
                "Service port published"
            );
            published.push((
                EnvironmentVariables::key(service.name(), port.field),
                host_port.to_string(),
            ));
        }
        Ok(published)
    }
}

#[async_trait]
impl ApplicationStack for ServiceStack {
    async fn start(&self, ctx: &StartContext) -> Result<EnvironmentVariables> {
        let settings = ServiceSettings::from_variables(ctx.variables())?;
        info!(env = %ctx.id(), services = self.services.len(), "Starting services");

        let started = try_join_all(
            self.services
                .iter()
                .map(|service| Self::start_service(ctx, &settings, *service)),
        )
        .await?;

        Ok(started.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use testbed_core::EnvironmentConfig;
    use testbed_core::ports::ContainerHandle;
    use testbed_core::testing::FakeRuntime;
    use testbed_env::{Environment, LifecycleState};

    #[tokio::test]
    async fn test_started_services_publish_their_ports() {
        let runtime = Arc::new(FakeRuntime::new());
        let env = Environment::builder(EnvironmentConfig::new("127.0.0.1").with_id("env_stack"))
            .runtime(runtime.clone())
            .application(Arc::new(ServiceStack::new([
                ServiceKind::Postgres,
                ServiceKind::Maildev,
            ])))
            .build()
            .unwrap();
        env.start().await.unwrap();

        let postgres = runtime.container("postgres").unwrap();
        let maildev = runtime.container("maildev").unwrap();
        let settings = env.settings();
        assert_eq!(settings.postgres.port, postgres.host_port(5432).unwrap());
        assert_eq!(settings.maildev.smtp_port, maildev.host_port(1025).unwrap());
        assert_eq!(settings.maildev.web_port, maildev.host_port(1080).unwrap());
        assert_eq!(settings.redis.port, 6379);

        let mut names: Vec<String> = runtime.specs().into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, vec!["env_stack-maildev", "env_stack-postgres"]);
        assert!(runtime.specs().iter().all(|s| s.log_sink.is_some()));
    }

    #[tokio::test]
    async fn test_one_failing_service_fails_start() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_start_of("redis");
        let env = Environment::builder(EnvironmentConfig::new("127.0.0.1"))
            .runtime(runtime.clone())
            .application(Arc::new(ServiceStack::new([
                ServiceKind::Postgres,
                ServiceKind::Redis,
            ])))
            .build()
            .unwrap();

        assert!(env.start().await.is_err());
        assert_eq!(env.state(), LifecycleState::StartFailed);
        env.stop().await.unwrap();
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let stack = ServiceStack::new([ServiceKind::Redis, ServiceKind::Redis]);
        assert_eq!(stack.services(), &[ServiceKind::Redis]);
    }
}
