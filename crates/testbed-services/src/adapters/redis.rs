//! A logical Redis database per environment.

use testbed_core::{Error, Result, ServiceEndpoint, validate_port};
use testbed_env::{Provisioned, ServiceContext};
use tracing::info;

const SERVICE: &str = "redis";

/// The environment's logical database.
#[derive(Debug, Clone)]
pub struct RedisDatabase {
    pub endpoint: ServiceEndpoint,
    pub database: u8,
}

impl RedisDatabase {
    pub fn url(&self) -> String {
        format!("redis://{}/{}", self.endpoint.address(), self.database)
    }

    pub fn client(&self) -> Result<redis::Client> {
        redis::Client::open(self.url()).map_err(|e| Error::provisioning(SERVICE, e))
    }
}

async fn run(database: &RedisDatabase, command: &str) -> Result<String> {
    let client = database.client()?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| Error::provisioning(SERVICE, e))?;
    redis::cmd(command)
        .query_async(&mut conn)
        .await
        .map_err(|e| Error::provisioning(SERVICE, e))
}

/// Checks the server answers and flushes the database on teardown.
#[derive(Debug, Clone)]
pub struct Redis {
    ctx: ServiceContext,
}

impl Redis {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn get(&self) -> Result<RedisDatabase> {
        let ctx = self.ctx.clone();
        let settings = ctx.settings().redis.clone();

        self.ctx
            .cached(SERVICE, move || {
                let port = validate_port(settings.port)?;
                if settings.database > 15 {
                    return Err(Error::Configuration(format!(
                        "Redis database index {} is out of range",
                        settings.database
                    )));
                }
                Ok(async move {
                    let endpoint = ctx.resolve(SERVICE, port).await?;
                    let resource = RedisDatabase {
                        endpoint,
                        database: settings.database,
                    };

                    let pong = run(&resource, "PING").await?;
                    info!(url = %resource.url(), reply = %pong, "Redis ready");

                    let flushed = resource.clone();
                    Ok(Provisioned::new(resource, move || async move {
                        run(&flushed, "FLUSHDB").await?;
                        info!(url = %flushed.url(), "Flushed Redis database");
                        Ok(())
                    }))
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testbed_core::{EnvironmentId, EnvironmentVariables, ServiceSettings};
    use testbed_env::EndpointResolver;

    #[test]
    fn test_url() {
        let db = RedisDatabase {
            endpoint: ServiceEndpoint::direct("10.0.0.1", 6379),
            database: 3,
        };
        assert_eq!(db.url(), "redis://10.0.0.1:6379/3");
        assert!(db.client().is_ok());
    }

    #[tokio::test]
    async fn test_database_index_is_checked_before_connecting() {
        let mut settings = ServiceSettings::default();
        settings.redis.database = 99;
        let ctx = ServiceContext::new(
            EnvironmentId::new("env_1"),
            EndpointResolver::direct("127.0.0.1"),
            EnvironmentVariables::new(),
            settings,
        );

        let err = Redis::new(ctx.clone()).get().await.unwrap_err();
        assert!(err.is_configuration());
        assert!(ctx.cache().is_empty().await);
    }
}
