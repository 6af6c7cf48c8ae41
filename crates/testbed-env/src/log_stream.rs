//! Container output to structured log entries.

use serde_json::{Map, Value};
use std::sync::Arc;
use testbed_core::ports::{LogFormatter, LogSink, SharedLogger, StreamOrigin};

/// [`LogSink`] that turns each line of container output into one entry on
/// the environment logger.
///
/// JSON objects are forwarded as-is, other JSON values and plain text are
/// wrapped as `{"msg": ...}`. Every entry is tagged with the container name
/// and, when known, the environment id.
pub struct ContainerLogForwarder {
    container: String,
    environment_id: Option<String>,
    formatter: Arc<dyn LogFormatter>,
    logger: SharedLogger,
}

impl ContainerLogForwarder {
    pub fn new(
        container: impl Into<String>,
        formatter: Arc<dyn LogFormatter>,
        logger: SharedLogger,
    ) -> Self {
        Self {
            container: container.into(),
            environment_id: None,
            formatter,
            logger,
        }
    }

    pub fn with_environment_id(mut self, id: impl Into<String>) -> Self {
        self.environment_id = Some(id.into());
        self
    }

    fn forward_line(&self, origin: StreamOrigin, line: &str) {
        let mut payload = parse_line(line);
        payload.insert("container".into(), Value::String(self.container.clone()));
        if let Some(id) = &self.environment_id {
            payload.insert("environmentId".into(), Value::String(id.clone()));
        }
        payload.insert("stream".into(), Value::String(origin.as_str().into()));

        let formatted = self.formatter.format(origin, &payload);
        payload.insert("msg".into(), Value::String(formatted.message));
        self.logger.log(formatted.level, Value::Object(payload));
    }
}

fn parse_line(line: &str) -> Map<String, Value> {
    let msg = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => return object,
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => line.to_string(),
    };
    let mut payload = Map::new();
    payload.insert("msg".into(), Value::String(msg));
    payload
}

impl LogSink for ContainerLogForwarder {
    fn accept(&self, origin: StreamOrigin, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        text.lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .for_each(|line| self.forward_line(origin, line));
    }
}

impl std::fmt::Debug for ContainerLogForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerLogForwarder")
            .field("container", &self.container)
            .field("environment_id", &self.environment_id)
            .finish_non_exhaustive()
    }
}
