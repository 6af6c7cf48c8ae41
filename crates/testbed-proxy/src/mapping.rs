//! Fault controls of one proxy mapping.

use crate::client::ToxiproxyClient;
use async_trait::async_trait;
use testbed_core::endpoint::FaultControls;
use testbed_core::toxic::Toxic;
use testbed_core::Result;
use tracing::info;

/// Controls for the Toxiproxy proxy named `name`.
#[derive(Debug, Clone)]
pub struct ProxyMapping {
    client: ToxiproxyClient,
    name: String,
}

impl ProxyMapping {
    pub fn new(client: ToxiproxyClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl FaultControls for ProxyMapping {
    async fn add_toxic(&self, toxic: Toxic) -> Result<()> {
        info!(
            proxy = %self.name,
            toxic = %toxic.name,
            kind = %toxic.kind,
            "Adding toxic"
        );
        self.client.add_toxic(&self.name, &toxic).await
    }

    async fn remove_toxic(&self, name: &str) -> Result<()> {
        info!(proxy = %self.name, toxic = %name, "Removing toxic");
        self.client.remove_toxic(&self.name, name).await
    }

    async fn set_enabled(&self, enabled: bool) -> Result<()> {
        info!(proxy = %self.name, enabled, "Toggling proxy");
        self.client.set_enabled(&self.name, enabled).await
    }
}
