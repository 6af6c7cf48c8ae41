//! Environment and service configuration.
//!
//! Settings are resolved once from an immutable [`EnvironmentVariables`]
//! snapshot instead of being read from the process environment by each
//! adapter.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix of every variable testbed reads or publishes.
pub const ENV_PREFIX: &str = "TESTBED";

/// Default fault-injection proxy image.
pub const DEFAULT_PROXY_IMAGE: &str = "ghcr.io/shopify/toxiproxy:2.9.0";

/// Serializable part of an environment's construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Caller-supplied identifier; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Address at which upstream containers and the gateway are reached.
    pub internal_host: String,
    /// Route service traffic through the fault-injection gateway.
    #[serde(default)]
    pub proxied: bool,
    /// Gateway image reference.
    #[serde(default = "default_proxy_image")]
    pub proxy_image: String,
}

fn default_proxy_image() -> String {
    DEFAULT_PROXY_IMAGE.to_string()
}

impl EnvironmentConfig {
    pub fn new(internal_host: impl Into<String>) -> Self {
        Self {
            id: None,
            internal_host: internal_host.into(),
            proxied: false,
            proxy_image: default_proxy_image(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    pub fn with_proxy_image(mut self, image: impl Into<String>) -> Self {
        self.proxy_image = image.into();
        self
    }

    /// Check required options before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.internal_host.trim().is_empty() {
            return Err(Error::Configuration("internal_host is required".into()));
        }
        if self.proxy_image.trim().is_empty() {
            return Err(Error::Configuration("proxy_image must not be empty".into()));
        }
        if matches!(&self.id, Some(id) if id.trim().is_empty()) {
            return Err(Error::Configuration("id must not be empty".into()));
        }
        Ok(())
    }
}

/// Immutable snapshot of `TESTBED_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentVariables(BTreeMap<String, String>);

impl EnvironmentVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the `TESTBED_*` variables of the current process.
    pub fn from_process() -> Self {
        let prefix = format!("{ENV_PREFIX}_");
        Self(
            std::env::vars()
                .filter(|(key, _)| key.starts_with(&prefix))
                .collect(),
        )
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new snapshot with `other` layered over `self`.
    pub fn merged(&self, other: &EnvironmentVariables) -> Self {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(merged)
    }

    /// Variable name for `service` and `field`, e.g. `TESTBED_POSTGRES__PORT`.
    pub fn key(service: &str, field: &str) -> String {
        format!(
            "{ENV_PREFIX}_{}__{}",
            service.to_ascii_uppercase(),
            field.to_ascii_uppercase()
        )
    }
}

impl FromIterator<(String, String)> for EnvironmentVariables {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Connection settings for every supported backing service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub postgres: PostgresSettings,
    pub redis: RedisSettings,
    pub minio: MinioSettings,
    pub mongo: MongoSettings,
    pub elasticsearch: ElasticsearchSettings,
    pub rabbitmq: RabbitMqSettings,
    pub eventstore: EventStoreSettings,
    pub maildev: MaildevSettings,
    pub clickhouse: ClickHouseSettings,
}

impl ServiceSettings {
    /// Resolve settings from a variable snapshot.
    ///
    /// Unset fields fall back to the vendor defaults.
    pub fn from_variables(variables: &EnvironmentVariables) -> Result<Self> {
        let source: config::Map<String, String> = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(source)),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Maintenance database used to create per-environment databases.
    pub database: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub port: u16,
    /// Logical database index reserved for the environment.
    pub database: u8,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            port: 6379,
            database: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinioSettings {
    pub port: u16,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl Default for MinioSettings {
    fn default() -> Self {
        Self {
            port: 9000,
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoSettings {
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            port: 27017,
            user: "mongo".to_string(),
            password: "mongo".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchSettings {
    pub port: u16,
}

impl Default for ElasticsearchSettings {
    fn default() -> Self {
        Self { port: 9200 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RabbitMqSettings {
    pub port: u16,
    pub management_port: u16,
    pub user: String,
    pub password: String,
}

impl Default for RabbitMqSettings {
    fn default() -> Self {
        Self {
            port: 5672,
            management_port: 15672,
            user: "guest".to_string(),
            password: "guest".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStoreSettings {
    pub port: u16,
}

impl Default for EventStoreSettings {
    fn default() -> Self {
        Self { port: 2113 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaildevSettings {
    pub smtp_port: u16,
    pub web_port: u16,
}

impl Default for MaildevSettings {
    fn default() -> Self {
        Self {
            smtp_port: 1025,
            web_port: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseSettings {
    /// HTTP interface port.
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for ClickHouseSettings {
    fn default() -> Self {
        Self {
            port: 8123,
            user: "default".to_string(),
            password: "clickhouse".to_string(),
        }
    }
}
