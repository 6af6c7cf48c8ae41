//! What a backing-service adapter receives from its environment.

use crate::cleanup::{CleanupAction, CleanupRegistry};
use crate::resolver::EndpointResolver;
use crate::resources::ResourceCache;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use testbed_core::ports::{NoopLogger, SharedLogger};
use testbed_core::{
    EnvironmentId, EnvironmentVariables, IntoPort, Result, ServiceEndpoint, ServiceSettings,
};

/// A freshly created resource together with the action that releases it.
pub struct Provisioned<T> {
    pub resource: T,
    teardown: CleanupAction,
}

impl<T> Provisioned<T> {
    pub fn new<F, Fut>(resource: T, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            resource,
            teardown: Box::new(move || teardown().boxed()),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Provisioned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioned")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Create the resource for `key` at most once, registering its teardown
/// with `cleanup` when creation succeeds.
///
/// Errors returned by `factory` itself leave `key` retryable; errors from
/// the future it returns are cached.
pub async fn with_cached_resource<T, F, Fut>(
    cache: &ResourceCache,
    cleanup: &CleanupRegistry,
    key: &str,
    factory: F,
) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Result<Fut> + Send,
    Fut: Future<Output = Result<Provisioned<T>>> + Send + 'static,
{
    let cleanup = cleanup.clone();
    let label = key.to_string();
    cache
        .get_or_create(key, move || {
            let pending = factory()?;
            Ok(async move {
                let provisioned = pending.await?;
                cleanup.register_boxed(label, provisioned.teardown).await;
                Ok(provisioned.resource)
            })
        })
        .await
}

/// Environment-scoped handles passed to every adapter.
#[derive(Clone)]
pub struct ServiceContext {
    id: EnvironmentId,
    resolver: EndpointResolver,
    variables: Arc<EnvironmentVariables>,
    settings: Arc<ServiceSettings>,
    cache: ResourceCache,
    cleanup: CleanupRegistry,
    logger: SharedLogger,
}

impl ServiceContext {
    /// Standalone context with its own cache and cleanup registry.
    pub fn new(
        id: EnvironmentId,
        resolver: EndpointResolver,
        variables: EnvironmentVariables,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            id,
            resolver,
            variables: Arc::new(variables),
            settings: Arc::new(settings),
            cache: ResourceCache::new(),
            cleanup: CleanupRegistry::new(),
            logger: Arc::new(NoopLogger),
        }
    }

    pub(crate) fn with_shared(
        mut self,
        cache: ResourceCache,
        cleanup: CleanupRegistry,
        logger: SharedLogger,
    ) -> Self {
        self.cache = cache;
        self.cleanup = cleanup;
        self.logger = logger;
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn id(&self) -> &EnvironmentId {
        &self.id
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    pub fn variables(&self) -> &EnvironmentVariables {
        &self.variables
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
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

    pub async fn resolve<P: IntoPort>(&self, name: &str, port: P) -> Result<ServiceEndpoint> {
        self.resolver.resolve(name, port).await
    }

    /// [`with_cached_resource`] against this context's cache and registry.
    pub async fn cached<T, F, Fut>(&self, key: &str, factory: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<Fut> + Send,
        Fut: Future<Output = Result<Provisioned<T>>> + Send + 'static,
    {
        with_cached_resource(&self.cache, &self.cleanup, key, factory).await
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("id", &self.id)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
