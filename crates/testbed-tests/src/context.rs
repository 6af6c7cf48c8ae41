//! A started environment for integration tests.

use std::sync::Arc;
use std::time::Duration;
use testbed_containers::TestcontainersRuntime;
use testbed_core::{EnvironmentConfig, EnvironmentVariables};
use testbed_env::{Environment, ServiceContext};
use testbed_services::{ServiceKind, ServiceStack};
use testbed_trace::TracingLogger;

/// Environment running the given services on the local Docker daemon.
///
/// Call [`stop`](Self::stop) at the end of the test; containers left behind
/// by a panicking test are removed when their handles drop.
pub struct TestEnvironment {
    pub env: Environment,
    pub ctx: ServiceContext,
}

impl TestEnvironment {
    pub async fn start(services: &[ServiceKind]) -> anyhow::Result<Self> {
        Self::start_with(services, false).await
    }

    pub async fn start_proxied(services: &[ServiceKind]) -> anyhow::Result<Self> {
        Self::start_with(services, true).await
    }

    async fn start_with(services: &[ServiceKind], proxied: bool) -> anyhow::Result<Self> {
        crate::init_test_logging();

        let env = Environment::builder(EnvironmentConfig::new("127.0.0.1").with_proxied(proxied))
            .runtime(Arc::new(
                TestcontainersRuntime::new().with_startup_timeout(Duration::from_secs(120)),
            ))
            .application(Arc::new(ServiceStack::new(services.iter().copied())))
            .logger(Arc::new(TracingLogger::new()))
            .variables(EnvironmentVariables::new())
            .build()?;

        if let Err(e) = env.start().await {
            let _ = env.stop().await;
            return Err(e.into());
        }

        let ctx = env.service_context()?;
        Ok(Self { env, ctx })
    }

    pub async fn stop(self) -> anyhow::Result<()> {
        self.env.stop().await?;
        Ok(())
    }
}
