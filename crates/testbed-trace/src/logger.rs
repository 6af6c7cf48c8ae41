//! Logger port backed by `tracing`.

use serde_json::Value;
use testbed_core::ports::Logger;
use tracing::{debug, error, info, trace, warn};

/// Forwards structured payloads to `tracing` events under the
/// `testbed::env` target.
///
/// The `msg` field, when present, becomes the event message; the whole
/// payload is attached as the `payload` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

fn message(payload: &Value) -> &str {
    payload
        .get("msg")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

impl Logger for TracingLogger {
    fn trace(&self, payload: Value) {
        trace!(target: "testbed::env", payload = %payload, "{}", message(&payload));
    }

    fn debug(&self, payload: Value) {
        debug!(target: "testbed::env", payload = %payload, "{}", message(&payload));
    }

    fn info(&self, payload: Value) {
        info!(target: "testbed::env", payload = %payload, "{}", message(&payload));
    }

    fn warn(&self, payload: Value) {
        warn!(target: "testbed::env", payload = %payload, "{}", message(&payload));
    }

    fn error(&self, payload: Value) {
        error!(target: "testbed::env", payload = %payload, "{}", message(&payload));
    }

    fn fatal(&self, payload: Value) {
        error!(target: "testbed::env", fatal = true, payload = %payload, "{}", message(&payload));
    }
}
