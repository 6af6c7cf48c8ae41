//! Container runtime for testbed built on `testcontainers`.

mod logs;
mod runtime;

pub use logs::SinkLogConsumer;
pub use runtime::{TestcontainersHandle, TestcontainersRuntime};
