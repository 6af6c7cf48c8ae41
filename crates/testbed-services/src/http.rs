//! HTTP helpers shared by the HTTP-speaking adapters.

use reqwest::{RequestBuilder, Response};
use std::time::Duration;
use testbed_core::{Error, Result};
use tracing::debug;

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// Send `request` and require a 2xx answer.
pub(crate) async fn send(service: &str, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::provisioning(service, format!("request failed: {e}")))?;

    let status = response.status();
    debug!(service = %service, url = %response.url(), status = %status, "Service request");
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::provisioning(
        service,
        format!("returned {}: {}", status, body.trim()),
    ))
}
