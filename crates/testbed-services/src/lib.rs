//! Backing services for testbed environments.
//!
//! [`ServiceStack`] starts the selected services from the catalogue; the
//! adapters in [`adapters`] provision one isolated resource per environment
//! inside them (a database, a bucket, a virtual host, ...) and register its
//! teardown.

pub mod adapters;
pub mod catalogue;
mod http;
mod naming;
pub mod stack;

pub use adapters::{
    ClickHouse, ClickHouseDatabase, Elasticsearch, ElasticsearchIndices, EventStore,
    EventStoreStreams, Mailbox, Maildev, Minio, MinioBucket, Mongo, MongoDatabase, Postgres,
    PostgresDatabase, RabbitMq, RabbitMqVhost, Redis, RedisDatabase,
};
pub use catalogue::{PublishedPort, ServiceKind};
pub use stack::ServiceStack;
