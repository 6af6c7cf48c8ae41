//! The shared Maildev mailbox.

use crate::http;
use serde_json::Value;
use testbed_core::{Error, Result, ServiceEndpoint, validate_port};
use testbed_env::{Provisioned, ServiceContext};
use tracing::info;

const SERVICE: &str = "maildev";

/// SMTP and web endpoints of the mail catcher.
#[derive(Debug, Clone)]
pub struct Mailbox {
    pub smtp: ServiceEndpoint,
    pub web: ServiceEndpoint,
}

impl Mailbox {
    pub fn web_url(&self) -> String {
        format!("http://{}", self.web.address())
    }

    /// Every message received so far.
    pub async fn messages(&self) -> Result<Vec<Value>> {
        let response = http::send(
            SERVICE,
            http::client().get(format!("{}/email", self.web_url())),
        )
        .await?;
        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid Maildev response: {e}")))
    }

    /// Delete every received message.
    pub async fn clear(&self) -> Result<()> {
        http::send(
            SERVICE,
            http::client().delete(format!("{}/email/all", self.web_url())),
        )
        .await
        .map(|_| ())
    }
}

/// Starts every environment with an empty mailbox and empties it again on
/// teardown.
#[derive(Debug, Clone)]
pub struct Maildev {
    ctx: ServiceContext,
}

impl Maildev {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn get(&self) -> Result<Mailbox> {
        let ctx = self.ctx.clone();
        let settings = self.ctx.settings().maildev.clone();

        self.ctx
            .cached(SERVICE, move || {
                let smtp_port = validate_port(settings.smtp_port)?;
                let web_port = validate_port(settings.web_port)?;
                Ok(async move {
                    let smtp = ctx.resolve(SERVICE, smtp_port).await?;
                    let web = ctx.resolve(&format!("{SERVICE}-web"), web_port).await?;
                    let mailbox = Mailbox { smtp, web };

                    mailbox.clear().await?;
                    info!(smtp = %mailbox.smtp, web = %mailbox.web, "Maildev ready");

                    let cleared = mailbox.clone();
                    Ok(Provisioned::new(mailbox, move || async move {
                        cleared.clear().await
                    }))
                })
            })
            .await
    }
}
