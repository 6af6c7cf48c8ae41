//! Port traits.
//!
//! These traits define the boundaries between environments and their
//! collaborators: logging, container runtimes and fault-injection gateways.

use crate::Result;
use crate::endpoint::ServiceEndpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Severity understood by the [`Logger`] port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured logger consumed by environments. Implementations must not
/// panic or block for long.
pub trait Logger: Send + Sync {
    fn trace(&self, payload: Value);
    fn debug(&self, payload: Value);
    fn info(&self, payload: Value);
    fn warn(&self, payload: Value);
    fn error(&self, payload: Value);
    fn fatal(&self, payload: Value);

    /// Dispatch to the method matching `level`.
    fn log(&self, level: LogLevel, payload: Value) {
        match level {
            LogLevel::Trace => self.trace(payload),
            LogLevel::Debug => self.debug(payload),
            LogLevel::Info => self.info(payload),
            LogLevel::Warn => self.warn(payload),
            LogLevel::Error => self.error(payload),
            LogLevel::Fatal => self.fatal(payload),
        }
    }
}

/// Logger used when the caller supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn trace(&self, _payload: Value) {}
    fn debug(&self, _payload: Value) {}
    fn info(&self, _payload: Value) {}
    fn warn(&self, _payload: Value) {}
    fn error(&self, _payload: Value) {}
    fn fatal(&self, _payload: Value) {}
}

/// Shared logger handle.
pub type SharedLogger = Arc<dyn Logger>;

/// Which output stream a container log chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

impl StreamOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOrigin::Stdout => "stdout",
            StreamOrigin::Stderr => "stderr",
        }
    }
}

/// Result of classifying a container log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedLog {
    pub level: LogLevel,
    pub message: String,
}

/// Severity classification of parsed container output.
pub trait LogFormatter: Send + Sync {
    fn format(&self, origin: StreamOrigin, payload: &serde_json::Map<String, Value>)
    -> FormattedLog;
}

/// Receiver of raw container output chunks.
pub trait LogSink: Send + Sync {
    fn accept(&self, origin: StreamOrigin, chunk: &[u8]);
}

/// When a started container counts as ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyCondition {
    /// Ready as soon as the runtime reports it running.
    Started,
    StdoutMessage(String),
    StderrMessage(String),
    /// An HTTP GET on `path` of container `port` answers 200.
    Http { port: u16, path: String },
}

/// Everything a runtime needs to start one container.
#[derive(Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub tag: String,
    pub exposed_ports: Vec<u16>,
    pub env: BTreeMap<String, String>,
    pub cmd: Vec<String>,
    pub ready: ReadyCondition,
    pub network: Option<String>,
    /// Host names that resolve to the Docker host from inside the container.
    pub host_gateway_aliases: Vec<String>,
    pub log_sink: Option<Arc<dyn LogSink>>,
}

impl ContainerSpec {
    /// Create a spec from an image reference such as `redis:7-alpine`.
    ///
    /// A missing tag means `latest`.
    pub fn new(name: impl Into<String>, image_ref: &str) -> Self {
        let (image, tag) = split_image_ref(image_ref);
        Self {
            name: name.into(),
            image,
            tag,
            exposed_ports: Vec::new(),
            env: BTreeMap::new(),
            cmd: Vec::new(),
            ready: ReadyCondition::Started,
            network: None,
            host_gateway_aliases: Vec::new(),
            log_sink: None,
        }
    }

    pub fn with_exposed_port(mut self, port: u16) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ready(mut self, ready: ReadyCondition) -> Self {
        self.ready = ready;
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Make `alias` resolve to the Docker host inside the container.
    pub fn with_host_gateway_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if !self.host_gateway_aliases.contains(&alias) {
            self.host_gateway_aliases.push(alias);
        }
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// `image:tag`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl fmt::Debug for ContainerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerSpec")
            .field("name", &self.name)
            .field("image", &self.image_ref())
            .field("exposed_ports", &self.exposed_ports)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

/// Split `registry/repo:tag` into repository and tag, leaving registry
/// ports (`localhost:5000/repo`) intact.
pub fn split_image_ref(image_ref: &str) -> (String, String) {
    let last_segment_start = image_ref.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image_ref[last_segment_start..].rfind(':') {
        Some(offset) => {
            let split = last_segment_start + offset;
            (
                image_ref[..split].to_string(),
                image_ref[split + 1..].to_string(),
            )
        }
        None => (image_ref.to_string(), "latest".to_string()),
    }
}

/// Options for stopping a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    pub remove_volumes: bool,
    pub remove: bool,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            remove_volumes: true,
            remove: true,
        }
    }
}

/// A started container.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Host port mapped to `container_port`.
    fn host_port(&self, container_port: u16) -> Result<u16>;

    async fn stop(&self, options: StopOptions) -> Result<()>;
}

/// Shared container handle.
pub type SharedContainer = Arc<dyn ContainerHandle>;

/// Capability to start containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn start(&self, spec: ContainerSpec) -> Result<SharedContainer>;
}

/// A fault-injection gateway able to front an upstream address.
#[async_trait]
pub trait ProxyGatewayPort: Send + Sync {
    /// Create a mapping named `logical_name` forwarding to `upstream`
    /// (`host:port`). Duplicate names are a caller error.
    async fn create_mapping(&self, logical_name: &str, upstream: &str) -> Result<ServiceEndpoint>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_ref() {
        assert_eq!(
            split_image_ref("ghcr.io/shopify/toxiproxy:2.9.0"),
            ("ghcr.io/shopify/toxiproxy".into(), "2.9.0".into())
        );
        assert_eq!(
            split_image_ref("redis"),
            ("redis".into(), "latest".into())
        );
        assert_eq!(
            split_image_ref("localhost:5000/mailcatcher"),
            ("localhost:5000/mailcatcher".into(), "latest".into())
        );
    }

    #[test]
    fn test_host_gateway_alias_added_once() {
        let spec = ContainerSpec::new("gw", "ghcr.io/shopify/toxiproxy:2.9.0")
            .with_host_gateway_alias("host.docker.internal")
            .with_host_gateway_alias("host.docker.internal");
        assert_eq!(spec.host_gateway_aliases, vec!["host.docker.internal".to_string()]);
    }

    #[test]
    fn test_noop_logger_dispatch() {
        let logger = NoopLogger;
        logger.log(LogLevel::Fatal, serde_json::json!({"msg": "ignored"}));
    }
}
