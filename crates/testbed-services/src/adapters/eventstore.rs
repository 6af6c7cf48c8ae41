//! A stream prefix per environment on the shared EventStoreDB node.

use crate::{http, naming};
use testbed_core::{Result, ServiceEndpoint, validate_port};
use testbed_env::{Provisioned, ServiceContext};
use tracing::{debug, info};

const SERVICE: &str = "eventstore";

/// Streams owned by the environment are named `<prefix>-*`.
#[derive(Debug, Clone)]
pub struct EventStoreStreams {
    pub endpoint: ServiceEndpoint,
    pub prefix: String,
}

impl EventStoreStreams {
    pub fn connection_string(&self) -> String {
        format!("esdb://{}?tls=false", self.endpoint.address())
    }

    pub fn stream(&self, name: &str) -> String {
        format!("{}-{}", self.prefix, name)
    }
}

#[derive(Debug, Clone)]
pub struct EventStore {
    ctx: ServiceContext,
}

impl EventStore {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn prefix(&self) -> String {
        naming::dashed("test", self.ctx.id(), 200)
    }

    pub async fn get(&self) -> Result<EventStoreStreams> {
        let ctx = self.ctx.clone();
        let port = self.ctx.settings().eventstore.port;
        let prefix = self.prefix();

        self.ctx
            .cached(SERVICE, move || {
                let port = validate_port(port)?;
                Ok(async move {
                    let endpoint = ctx.resolve(SERVICE, port).await?;
                    http::send(
                        SERVICE,
                        http::client().get(format!("http://{}/health/live", endpoint.address())),
                    )
                    .await?;
                    info!(endpoint = %endpoint, prefix = %prefix, "EventStore ready");

                    let resource = EventStoreStreams { endpoint, prefix };
                    let released = resource.prefix.clone();
                    Ok(Provisioned::new(resource, move || async move {
                        debug!(prefix = %released, "Released EventStore stream prefix");
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_liveness_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/live"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = ServiceSettings::default();
        settings.eventstore.port = server.address().port();
        let ctx = ServiceContext::new(
            EnvironmentId::new("env_es_db"),
            EndpointResolver::direct("127.0.0.1"),
            EnvironmentVariables::new(),
            settings,
        );

        let adapter = EventStore::new(ctx);
        let streams = adapter.get().await.unwrap();
        adapter.get().await.unwrap();

        assert_eq!(streams.stream("orders"), "test-env-es-db-orders");
        assert_eq!(
            streams.connection_string(),
            format!("esdb://127.0.0.1:{}?tls=false", server.address().port())
        );
    }
}
