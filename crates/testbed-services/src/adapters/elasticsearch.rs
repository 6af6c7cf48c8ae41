//! An index prefix per environment on the shared Elasticsearch node.

use crate::{http, naming};
use testbed_core::{Result, ServiceEndpoint, validate_port};
use testbed_env::{Provisioned, ServiceContext};
use tracing::info;

const SERVICE: &str = "elasticsearch";

/// Indices owned by the environment are named `<prefix>-*`.
#[derive(Debug, Clone)]
pub struct ElasticsearchIndices {
    pub endpoint: ServiceEndpoint,
    pub prefix: String,
}

impl ElasticsearchIndices {
    pub fn url(&self) -> String {
        format!("http://{}", self.endpoint.address())
    }

    /// Full name of the environment's index `name`.
    pub fn index(&self, name: &str) -> String {
        format!("{}-{}", self.prefix, name)
    }
}

/// Waits for the cluster to be usable; deletes the prefixed indices on
/// teardown.
#[derive(Debug, Clone)]
pub struct Elasticsearch {
    ctx: ServiceContext,
}

impl Elasticsearch {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn prefix(&self) -> String {
        naming::dashed("test", self.ctx.id(), 200)
    }

    pub async fn get(&self) -> Result<ElasticsearchIndices> {
        let ctx = self.ctx.clone();
        let port = self.ctx.settings().elasticsearch.port;
        let prefix = self.prefix();

        self.ctx
            .cached(SERVICE, move || {
                let port = validate_port(port)?;
                Ok(async move {
                    let endpoint = ctx.resolve(SERVICE, port).await?;
                    let resource = ElasticsearchIndices { endpoint, prefix };

                    let client = http::client();
                    http::send(
                        SERVICE,
                        client
                            .get(format!("{}/_cluster/health", resource.url()))
                            .query(&[("wait_for_status", "yellow"), ("timeout", "30s")]),
                    )
                    .await?;
                    info!(url = %resource.url(), prefix = %resource.prefix, "Elasticsearch ready");

                    let indices = resource.clone();
                    Ok(Provisioned::new(resource, move || async move {
                        http::send(
                            SERVICE,
                            client
                                .delete(format!("{}/{}", indices.url(), indices.index("*")))
                                .query(&[("ignore_unavailable", "true")]),
                        )
                        .await?;
                        info!(prefix = %indices.prefix, "Deleted Elasticsearch indices");
                        Ok(())
                    }))
                })
            })
            .await
    }
}
