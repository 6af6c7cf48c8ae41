//! A bucket per environment on the shared MinIO server.

use crate::naming;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use testbed_core::{Error, Result, ServiceEndpoint, validate_port};
use testbed_env::{Provisioned, ServiceContext};
use tracing::{debug, info};

const SERVICE: &str = "minio";

fn s3_error<E: std::error::Error>(e: E) -> Error {
    Error::provisioning(SERVICE, DisplayErrorContext(e))
}

/// The environment's bucket and the credentials to use it.
#[derive(Debug, Clone)]
pub struct MinioBucket {
    pub endpoint: ServiceEndpoint,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl MinioBucket {
    pub fn endpoint_url(&self) -> String {
        format!("http://{}", self.endpoint.address())
    }

    /// S3 client configured for this MinIO server (path-style addressing).
    pub fn client(&self) -> Client {
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(self.endpoint_url())
            .region(Region::new(self.region.clone()))
            .credentials_provider(Credentials::new(
                self.access_key.clone(),
                self.secret_key.clone(),
                None,
                None,
                "testbed",
            ))
            .force_path_style(true)
            .build();
        Client::from_conf(config)
    }

    async fn create(&self) -> Result<()> {
        self.client()
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(s3_error)?;
        Ok(())
    }

    /// Delete every object, then the bucket itself.
    async fn remove(&self) -> Result<()> {
        let client = self.client();
        let mut pages = client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        let mut deleted = 0usize;
        while let Some(page) = pages.next().await {
            let page = page.map_err(s3_error)?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(s3_error)?;
                deleted += 1;
            }
        }
        debug!(bucket = %self.bucket, deleted, "Emptied MinIO bucket");

        client
            .delete_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(s3_error)?;
        Ok(())
    }
}

/// Creates `test-<env>` on first use; empties and deletes it on teardown.
#[derive(Debug, Clone)]
pub struct Minio {
    ctx: ServiceContext,
}

impl Minio {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn bucket_name(&self) -> String {
        naming::dashed("test", self.ctx.id(), 63)
    }

    pub async fn get(&self) -> Result<MinioBucket> {
        let ctx = self.ctx.clone();
        let settings = self.ctx.settings().minio.clone();
        let bucket = self.bucket_name();

        self.ctx
            .cached(SERVICE, move || {
                let port = validate_port(settings.port)?;
                if bucket.len() < 3 {
                    return Err(Error::Configuration(format!(
                        "Bucket name {bucket} is too short"
                    )));
                }
                Ok(async move {
                    let endpoint = ctx.resolve(SERVICE, port).await?;
                    let resource = MinioBucket {
                        endpoint,
                        bucket,
                        access_key: settings.access_key,
                        secret_key: settings.secret_key,
                        region: settings.region,
                    };

                    resource.create().await?;
                    info!(bucket = %resource.bucket, url = %resource.endpoint_url(), "Created MinIO bucket");

                    let owned = resource.clone();
                    Ok(Provisioned::new(resource, move || async move {
                        owned.remove().await?;
                        info!(bucket = %owned.bucket, "Deleted MinIO bucket");
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

    fn context(id: &str, port: u16) -> ServiceContext {
        let mut settings = ServiceSettings::default();
        settings.minio.port = port;
        ServiceContext::new(
            EnvironmentId::new(id),
            EndpointResolver::direct("127.0.0.1"),
            EnvironmentVariables::new(),
            settings,
        )
    }

    #[test]
    fn test_bucket_name_is_dns_safe() {
        let minio = Minio::new(context("env_0192F3A4_B5", 9000));
        assert_eq!(minio.bucket_name(), "test-env-0192f3a4-b5");

        let long = Minio::new(context(&"x".repeat(100), 9000));
        assert_eq!(long.bucket_name().len(), 63);
    }

    #[tokio::test]
    async fn test_bucket_created_path_style() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/test-env-s3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context("env_s3", server.address().port());
        let bucket = Minio::new(ctx.clone()).get().await.unwrap();

        assert_eq!(bucket.bucket, "test-env-s3");
        assert_eq!(
            bucket.endpoint_url(),
            format!("http://127.0.0.1:{}", server.address().port())
        );
        assert_eq!(ctx.cleanup().len().await, 1);
    }
}
