//! One adapter per backing service.
//!
//! Every adapter is built from a [`ServiceContext`](testbed_env::ServiceContext)
//! and provisions its resource at most once per environment, no matter how
//! many callers ask for it concurrently.

mod clickhouse;
mod elasticsearch;
mod eventstore;
mod maildev;
mod minio;
mod mongo;
mod postgres;
mod rabbitmq;
mod redis;

pub use clickhouse::{ClickHouse, ClickHouseDatabase};
pub use elasticsearch::{Elasticsearch, ElasticsearchIndices};
pub use eventstore::{EventStore, EventStoreStreams};
pub use maildev::{Mailbox, Maildev};
pub use minio::{Minio, MinioBucket};
pub use mongo::{Mongo, MongoDatabase};
pub use postgres::{Postgres, PostgresDatabase};
pub use rabbitmq::{RabbitMq, RabbitMqVhost};
pub use redis::{Redis, RedisDatabase};
