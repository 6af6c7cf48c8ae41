//! Images, ports and readiness of the supported backing services.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use testbed_core::ports::{ContainerSpec, ReadyCondition};
use testbed_core::{Error, ServiceSettings};

/// A backing service the stack knows how to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Postgres,
    Redis,
    Minio,
    Mongo,
    Elasticsearch,
    RabbitMq,
    EventStore,
    Maildev,
    ClickHouse,
}

/// A container port whose host mapping is published as a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPort {
    pub container_port: u16,
    /// Settings field the mapped port is published under.
    pub field: &'static str,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 9] = [
        ServiceKind::Postgres,
        ServiceKind::Redis,
        ServiceKind::Minio,
        ServiceKind::Mongo,
        ServiceKind::Elasticsearch,
        ServiceKind::RabbitMq,
        ServiceKind::EventStore,
        ServiceKind::Maildev,
        ServiceKind::ClickHouse,
    ];

    /// Logical service name; also the settings section and cache key.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Postgres => "postgres",
            ServiceKind::Redis => "redis",
            ServiceKind::Minio => "minio",
            ServiceKind::Mongo => "mongo",
            ServiceKind::Elasticsearch => "elasticsearch",
            ServiceKind::RabbitMq => "rabbitmq",
            ServiceKind::EventStore => "eventstore",
            ServiceKind::Maildev => "maildev",
            ServiceKind::ClickHouse => "clickhouse",
        }
    }

    pub fn image(&self) -> &'static str {
        match self {
            ServiceKind::Postgres => "postgres:16-alpine",
            ServiceKind::Redis => "redis:7-alpine",
            ServiceKind::Minio => "minio/minio:RELEASE.2024-05-10T01-41-38Z",
            ServiceKind::Mongo => "mongo:7",
            ServiceKind::Elasticsearch => "docker.elastic.co/elasticsearch/elasticsearch:8.13.4",
            ServiceKind::RabbitMq => "rabbitmq:3.13-management-alpine",
            ServiceKind::EventStore => "eventstore/eventstore:23.10.1-bookworm-slim",
            ServiceKind::Maildev => "maildev/maildev:2.1.0",
            ServiceKind::ClickHouse => "clickhouse/clickhouse-server:24.3-alpine",
        }
    }

    /// Ports published as `TESTBED_<SERVICE>__<FIELD>` once started.
    pub fn published_ports(&self) -> Vec<PublishedPort> {
        let port = |container_port: u16, field: &'static str| PublishedPort {
            container_port,
            field,
        };
        match self {
            ServiceKind::Postgres => vec![port(5432, "port")],
            ServiceKind::Redis => vec![port(6379, "port")],
            ServiceKind::Minio => vec![port(9000, "port")],
            ServiceKind::Mongo => vec![port(27017, "port")],
            ServiceKind::Elasticsearch => vec![port(9200, "port")],
            ServiceKind::RabbitMq => vec![port(5672, "port"), port(15672, "management_port")],
            ServiceKind::EventStore => vec![port(2113, "port")],
            ServiceKind::Maildev => vec![port(1025, "smtp_port"), port(1080, "web_port")],
            ServiceKind::ClickHouse => vec![port(8123, "port")],
        }
    }

    /// Container definition named `container_name`, with credentials taken
    /// from `settings`.
    pub fn container_spec(&self, container_name: &str, settings: &ServiceSettings) -> ContainerSpec {
        let mut spec = ContainerSpec::new(container_name, self.image());
        for published in self.published_ports() {
            spec = spec.with_exposed_port(published.container_port);
        }

        match self {
            ServiceKind::Postgres => spec
                .with_env("POSTGRES_USER", settings.postgres.user.clone())
                .with_env("POSTGRES_PASSWORD", settings.postgres.password.clone())
                .with_env("POSTGRES_DB", settings.postgres.database.clone())
                .with_ready(ReadyCondition::StderrMessage(
                    "database system is ready to accept connections".into(),
                )),
            ServiceKind::Redis => spec.with_ready(ReadyCondition::StdoutMessage(
                "Ready to accept connections".into(),
            )),
            ServiceKind::Minio => spec
                .with_env("MINIO_ROOT_USER", settings.minio.access_key.clone())
                .with_env("MINIO_ROOT_PASSWORD", settings.minio.secret_key.clone())
                .with_cmd(["server", "/data"])
                .with_ready(ReadyCondition::Http {
                    port: 9000,
                    path: "/minio/health/live".into(),
                }),
            ServiceKind::Mongo => spec
                .with_env("MONGO_INITDB_ROOT_USERNAME", settings.mongo.user.clone())
                .with_env("MONGO_INITDB_ROOT_PASSWORD", settings.mongo.password.clone())
                .with_ready(ReadyCondition::StdoutMessage("Waiting for connections".into())),
            ServiceKind::Elasticsearch => spec
                .with_env("discovery.type", "single-node")
                .with_env("xpack.security.enabled", "false")
                .with_env("action.destructive_requires_name", "false")
                .with_env("ES_JAVA_OPTS", "-Xms512m -Xmx512m")
                .with_ready(ReadyCondition::Http {
                    port: 9200,
                    path: "/_cluster/health".into(),
                }),
            ServiceKind::RabbitMq => spec
                .with_env("RABBITMQ_DEFAULT_USER", settings.rabbitmq.user.clone())
                .with_env("RABBITMQ_DEFAULT_PASS", settings.rabbitmq.password.clone())
                .with_ready(ReadyCondition::StdoutMessage("Server startup complete".into())),
            ServiceKind::EventStore => spec
                .with_env("EVENTSTORE_INSECURE", "true")
                .with_env("EVENTSTORE_RUN_PROJECTIONS", "All")
                .with_env("EVENTSTORE_MEM_DB", "true")
                .with_ready(ReadyCondition::Http {
                    port: 2113,
                    path: "/health/live".into(),
                }),
            ServiceKind::Maildev => spec.with_ready(ReadyCondition::Http {
                port: 1080,
                path: "/healthz".into(),
            }),
            ServiceKind::ClickHouse => spec
                .with_env("CLICKHOUSE_USER", settings.clickhouse.user.clone())
                .with_env("CLICKHOUSE_PASSWORD", settings.clickhouse.password.clone())
                .with_env("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
                .with_ready(ReadyCondition::Http {
                    port: 8123,
                    path: "/ping".into(),
                }),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| Error::Configuration(format!("Unknown service: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_round_trip() {
        for kind in ServiceKind::ALL {
            assert_eq!(kind.name().parse::<ServiceKind>().unwrap(), kind);
        }
        assert_eq!(" RabbitMQ ".parse::<ServiceKind>().unwrap(), ServiceKind::RabbitMq);
        assert!("oracle".parse::<ServiceKind>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_spec_uses_settings_credentials() {
        let mut settings = ServiceSettings::default();
        settings.postgres.password = "secret".into();

        let spec = ServiceKind::Postgres.container_spec("env_1-postgres", &settings);
        assert_eq!(spec.name, "env_1-postgres");
        assert_eq!(spec.image_ref(), "postgres:16-alpine");
        assert_eq!(spec.exposed_ports, vec![5432]);
        assert_eq!(spec.env.get("POSTGRES_PASSWORD").map(String::as_str), Some("secret"));
    }

    #[test]
    fn test_multi_port_services() {
        let spec = ServiceKind::RabbitMq.container_spec("mq", &ServiceSettings::default());
        assert_eq!(spec.exposed_ports, vec![5672, 15672]);

        let fields: Vec<_> = ServiceKind::Maildev
            .published_ports()
            .into_iter()
            .map(|p| p.field)
            .collect();
        assert_eq!(fields, vec!["smtp_port", "web_port"]);
    }
}
