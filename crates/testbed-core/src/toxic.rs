//! Network impairments applied to proxied connections.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// Kind of simulated network condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToxicKind {
    Latency,
    Bandwidth,
    SlowClose,
    Timeout,
    ResetPeer,
    Slicer,
    LimitData,
    #[serde(untagged)]
    Custom(String),
}

impl ToxicKind {
    pub fn as_str(&self) -> &str {
        match self {
            ToxicKind::Latency => "latency",
            ToxicKind::Bandwidth => "bandwidth",
            ToxicKind::SlowClose => "slow_close",
            ToxicKind::Timeout => "timeout",
            ToxicKind::ResetPeer => "reset_peer",
            ToxicKind::Slicer => "slicer",
            ToxicKind::LimitData => "limit_data",
            ToxicKind::Custom(kind) => kind,
        }
    }
}

impl fmt::Display for ToxicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the connection the toxic applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToxicDirection {
    /// Server to client.
    #[default]
    Downstream,
    /// Client to server.
    Upstream,
}

/// A named toxic. Names must be unique per mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toxic {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ToxicKind,
    #[serde(rename = "stream", default)]
    pub direction: ToxicDirection,
    #[serde(default = "default_toxicity")]
    pub toxicity: f32,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

fn default_toxicity() -> f32 {
    1.0
}

impl Toxic {
    pub fn new(name: impl Into<String>, kind: ToxicKind) -> Self {
        Self {
            name: name.into(),
            kind,
            direction: ToxicDirection::default(),
            toxicity: default_toxicity(),
            attributes: Map::new(),
        }
    }

    /// Delay every chunk by `latency_ms` plus up to `jitter_ms`.
    pub fn latency(name: impl Into<String>, latency_ms: u64, jitter_ms: u64) -> Self {
        Self::new(name, ToxicKind::Latency)
            .with_attribute("latency", json!(latency_ms))
            .with_attribute("jitter", json!(jitter_ms))
    }

    /// Limit throughput to `rate_kb` kilobytes per second.
    pub fn bandwidth(name: impl Into<String>, rate_kb: u64) -> Self {
        Self::new(name, ToxicKind::Bandwidth).with_attribute("rate", json!(rate_kb))
    }

    /// Delay closing the socket by `delay_ms`.
    pub fn slow_close(name: impl Into<String>, delay_ms: u64) -> Self {
        Self::new(name, ToxicKind::SlowClose).with_attribute("delay", json!(delay_ms))
    }

    /// Stop all data and close after `timeout_ms` (0 keeps it open forever).
    pub fn timeout(name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::new(name, ToxicKind::Timeout).with_attribute("timeout", json!(timeout_ms))
    }

    /// Reset the connection with RST after `timeout_ms`.
    pub fn reset_peer(name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::new(name, ToxicKind::ResetPeer).with_attribute("timeout", json!(timeout_ms))
    }

    /// Close the connection once `bytes` have been transmitted.
    pub fn limit_data(name: impl Into<String>, bytes: u64) -> Self {
        Self::new(name, ToxicKind::LimitData).with_attribute("bytes", json!(bytes))
    }

    pub fn with_direction(mut self, direction: ToxicDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn upstream(self) -> Self {
        self.with_direction(ToxicDirection::Upstream)
    }

    pub fn with_toxicity(mut self, toxicity: f32) -> Self {
        self.toxicity = toxicity.clamp(0.0, 1.0);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
