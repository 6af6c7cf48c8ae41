//! Default classification of container log lines.

use serde_json::{Map, Value};
use testbed_core::ports::{FormattedLog, LogFormatter, LogLevel, StreamOrigin};

/// Reads the level from a `level` field (names or pino-style numbers) and
/// the message from `msg` or `message`.
///
/// Lines without a recognizable level are `info` on stdout and `warn` on
/// stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLogFormatter;

fn level_from_name(name: &str) -> Option<LogLevel> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" | "information" | "notice" | "log" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" | "err" => Some(LogLevel::Error),
        "fatal" | "critical" | "panic" | "emergency" => Some(LogLevel::Fatal),
        _ => None,
    }
}

fn level_from_number(level: u64) -> LogLevel {
    match level {
        0..=10 => LogLevel::Trace,
        11..=20 => LogLevel::Debug,
        21..=30 => LogLevel::Info,
        31..=40 => LogLevel::Warn,
        41..=50 => LogLevel::Error,
        _ => LogLevel::Fatal,
    }
}

fn level_of(payload: &Map<String, Value>) -> Option<LogLevel> {
    match payload.get("level")? {
        Value::String(name) => level_from_name(name),
        Value::Number(n) => n.as_u64().map(level_from_number),
        _ => None,
    }
}

impl LogFormatter for DefaultLogFormatter {
    fn format(&self, origin: StreamOrigin, payload: &Map<String, Value>) -> FormattedLog {
        let level = level_of(payload).unwrap_or(match origin {
            StreamOrigin::Stdout => LogLevel::Info,
            StreamOrigin::Stderr => LogLevel::Warn,
        });

        let message = ["msg", "message"]
            .iter()
            .find_map(|key| payload.get(*key))
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(payload.clone()).to_string());

        FormattedLog { level, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_named_level() {
        let log = DefaultLogFormatter.format(
            StreamOrigin::Stdout,
            &object(json!({"level": "WARNING", "msg": "disk almost full"})),
        );
        assert_eq!(log.level, LogLevel::Warn);
        assert_eq!(log.message, "disk almost full");
    }

    #[test]
    fn test_pino_numeric_level() {
        let log = DefaultLogFormatter.format(
            StreamOrigin::Stdout,
            &object(json!({"level": 50, "message": "failed"})),
        );
        assert_eq!(log.level, LogLevel::Error);
        assert_eq!(log.message, "failed");
    }

    #[test]
    fn test_origin_fallback() {
        let payload = object(json!({"msg": "plain"}));
        assert_eq!(
            DefaultLogFormatter.format(StreamOrigin::Stdout, &payload).level,
            LogLevel::Info
        );
        assert_eq!(
            DefaultLogFormatter.format(StreamOrigin::Stderr, &payload).level,
            LogLevel::Warn
        );
    }

    #[test]
    fn test_message_falls_back_to_payload() {
        let log = DefaultLogFormatter.format(StreamOrigin::Stdout, &object(json!({"a": 1})));
        assert_eq!(log.message, r#"{"a":1}"#);
    }
}
