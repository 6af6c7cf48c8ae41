//! Environment lifecycle and resource acquisition.
//!
//! An [`Environment`] starts an optional fault-injection gateway and the
//! application containers, hands out [`ServiceContext`]s to backing-service
//! adapters, and tears everything down in a fixed order on stop:
//! registered cleanups, then the resource cache, then the containers.

pub mod cleanup;
pub mod context;
pub mod environment;
pub mod log_stream;
pub mod resolver;
pub mod resources;

pub use cleanup::{CleanupRegistry, CleanupReport};
pub use context::{Provisioned, ServiceContext, with_cached_resource};
pub use environment::{
    ApplicationStack, Environment, EnvironmentBuilder, LifecycleState, NoApplication,
    StartContext,
};
pub use log_stream::ContainerLogForwarder;
pub use resolver::EndpointResolver;
pub use resources::ResourceCache;
