//! A virtual host per environment on the shared RabbitMQ broker.

use crate::{http, naming};
use serde_json::json;
use testbed_core::{Result, ServiceEndpoint, validate_port};
use testbed_env::{Provisioned, ServiceContext};
use tracing::info;

const SERVICE: &str = "rabbitmq";

/// The environment's virtual host and the endpoints to reach it.
#[derive(Debug, Clone)]
pub struct RabbitMqVhost {
    /// AMQP endpoint.
    pub endpoint: ServiceEndpoint,
    /// HTTP management API endpoint.
    pub management: ServiceEndpoint,
    pub vhost: String,
    pub user: String,
    pub password: String,
}

impl RabbitMqVhost {
    pub fn amqp_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}/{}",
            self.user,
            self.password,
            self.endpoint.address(),
            self.vhost
        )
    }

    pub fn management_url(&self) -> String {
        format!("http://{}/api", self.management.address())
    }

    fn vhost_url(&self) -> String {
        format!("{}/vhosts/{}", self.management_url(), self.vhost)
    }

    fn permissions_url(&self) -> String {
        format!(
            "{}/permissions/{}/{}",
            self.management_url(),
            self.vhost,
            self.user
        )
    }
}

/// Creates the virtual host through the management API, grants the
/// configured user full access and deletes it on teardown.
#[derive(Debug, Clone)]
pub struct RabbitMq {
    ctx: ServiceContext,
}

impl RabbitMq {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn vhost_name(&self) -> String {
        naming::dashed("test", self.ctx.id(), 200)
    }

    pub async fn get(&self) -> Result<RabbitMqVhost> {
        let ctx = self.ctx.clone();
        let settings = ctx.settings().rabbitmq.clone();
        let vhost = self.vhost_name();

        self.ctx
            .cached(SERVICE, move || {
                let amqp_port = validate_port(settings.port)?;
                let management_port = validate_port(settings.management_port)?;
                Ok(async move {
                    let endpoint = ctx.resolve(SERVICE, amqp_port).await?;
                    let management = ctx
                        .resolve(&format!("{SERVICE}-management"), management_port)
                        .await?;
                    let resource = RabbitMqVhost {
                        endpoint,
                        management,
                        vhost,
                        user: settings.user,
                        password: settings.password,
                    };

                    let client = http::client();
                    http::send(
                        SERVICE,
                        client
                            .put(resource.vhost_url())
                            .basic_auth(&resource.user, Some(&resource.password)),
                    )
                    .await?;
                    http::send(
                        SERVICE,
                        client
                            .put(resource.permissions_url())
                            .basic_auth(&resource.user, Some(&resource.password))
                            .json(&json!({"configure": ".*", "write": ".*", "read": ".*"})),
                    )
                    .await?;
                    info!(vhost = %resource.vhost, "Created RabbitMQ virtual host");

                    let owned = resource.clone();
                    Ok(Provisioned::new(resource, move || async move {
                        http::send(
                            SERVICE,
                            client
                                .delete(owned.vhost_url())
                                .basic_auth(&owned.user, Some(&owned.password)),
                        )
                        .await?;
                        info!(vhost = %owned.vhost, "Deleted RabbitMQ virtual host");
                        Ok(())
                    }))
                })
            })
            .await
    }
}
