//! A database per environment on the shared ClickHouse server.

use crate::{http, naming};
use testbed_core::{Result, ServiceEndpoint, validate_port};
use testbed_env::{Provisioned, ServiceContext};
use tracing::info;

const SERVICE: &str = "clickhouse";

/// The environment's database, reached over the HTTP interface.
#[derive(Debug, Clone)]
pub struct ClickHouseDatabase {
    pub endpoint: ServiceEndpoint,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ClickHouseDatabase {
    pub fn url(&self) -> String {
        format!("http://{}", self.endpoint.address())
    }

    /// Run `query` and return the raw response body.
    pub async fn execute(&self, query: &str) -> Result<String> {
        let response = http::send(
            SERVICE,
            http::client()
                .post(format!("{}/", self.url()))
                .header("X-ClickHouse-User", &self.user)
                .header("X-ClickHouse-Key", &self.password)
                .body(query.to_string()),
        )
        .await?;
        response
            .text()
            .await
            .map_err(|e| testbed_core::Error::Http(e.to_string()))
    }
}

/// Creates `test_<env>` on first use and drops it on teardown.
#[derive(Debug, Clone)]
pub struct ClickHouse {
    ctx: ServiceContext,
}

impl ClickHouse {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn database_name(&self) -> String {
        naming::identifier("test", self.ctx.id(), 200)
    }

    pub async fn get(&self) -> Result<ClickHouseDatabase> {
        let ctx = self.ctx.clone();
        let settings = self.ctx.settings().clickhouse.clone();
        let database = self.database_name();

        self.ctx
            .cached(SERVICE, move || {
                let port = validate_port(settings.port)?;
                Ok(async move {
                    let endpoint = ctx.resolve(SERVICE, port).await?;
                    let resource = ClickHouseDatabase {
                        endpoint,
                        database,
                        user: settings.user,
                        password: settings.password,
                    };

                    resource
                        .execute(&format!("CREATE DATABASE IF NOT EXISTS `{}`", resource.database))
                        .await?;
                    info!(database = %resource.database, "Created ClickHouse database");

                    let owned = resource.clone();
                    Ok(Provisioned::new(resource, move || async move {
                        owned
                            .execute(&format!("DROP DATABASE IF EXISTS `{}`", owned.database))
                            .await?;
                        info!(database = %owned.database, "Dropped ClickHouse database");
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
    use testbed_core::ports::NoopLogger;
    use testbed_core::{EnvironmentId, EnvironmentVariables, ServiceSettings};
    use testbed_env::EndpointResolver;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_database_created_and_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-ClickHouse-User", "default"))
            .and(body_string("CREATE DATABASE IF NOT EXISTS `test_env_ch`"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string("DROP DATABASE IF EXISTS `test_env_ch`"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = ServiceSettings::default();
        settings.clickhouse.port = server.address().port();
        let ctx = ServiceContext::new(
            EnvironmentId::new("env_ch"),
            EndpointResolver::direct("127.0.0.1"),
            EnvironmentVariables::new(),
            settings,
        );

        let db = ClickHouse::new(ctx.clone()).get().await.unwrap();
        assert_eq!(db.database, "test_env_ch");

        let report = ctx.cleanup().run_all(&NoopLogger).await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_server_error_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Code: 81"))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = ServiceSettings::default();
        settings.clickhouse.port = server.address().port();
        let ctx = ServiceContext::new(
            EnvironmentId::new("env_ch"),
            EndpointResolver::direct("127.0.0.1"),
            EnvironmentVariables::new(),
            settings,
        );

        let adapter = ClickHouse::new(ctx);
        let first = adapter.get().await.unwrap_err();
        let second = adapter.get().await.unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
        assert!(first.to_string().contains("Code: 81"));
    }
}
