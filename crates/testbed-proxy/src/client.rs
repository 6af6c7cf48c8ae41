//! Toxiproxy control API client.

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use testbed_core::toxic::Toxic;
use testbed_core::{Error, Result};
use tracing::debug;

/// A proxy as reported by the control API.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyInfo {
    pub name: String,
    pub listen: String,
    pub upstream: String,
    pub enabled: bool,
    #[serde(default)]
    pub toxics: Vec<Toxic>,
}

/// Thin client for the Toxiproxy HTTP API.
#[derive(Debug, Clone)]
pub struct ToxiproxyClient {
    client: Client,
    base_url: String,
}

impl ToxiproxyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Toxiproxy request");

        let mut req = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let res = req
            .send()
            .await
            .map_err(|e| Error::Http(format!("{} {} failed: {}", method, path, e)))?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let text = res.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::CONFLICT => {
                Error::Gateway(format!("{} {} conflicts: {}", method, path, text.trim()))
            }
            StatusCode::NOT_FOUND => {
                Error::Gateway(format!("{} {} not found: {}", method, path, text.trim()))
            }
            _ => Error::Gateway(format!(
                "{} {} returned {}: {}",
                method,
                path,
                status,
                text.trim()
            )),
        })
    }

    /// Server version, used as a liveness check.
    pub async fn version(&self) -> Result<String> {
        let res = self.send(Method::GET, "/version", None).await?;
        res.text()
            .await
            .map(|v| v.trim().to_string())
            .map_err(|e| Error::Http(e.to_string()))
    }

    pub async fn create_proxy(&self, name: &str, listen: &str, upstream: &str) -> Result<ProxyInfo> {
        let body = json!({
            "name": name,
            "listen": listen,
            "upstream": upstream,
            "enabled": true,
        });
        let res = self.send(Method::POST, "/proxies", Some(body)).await?;
        res.json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid proxy response: {}", e)))
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.send(
            Method::POST,
            &format!("/proxies/{}", name),
            Some(json!({ "enabled": enabled })),
        )
        .await?;
        Ok(())
    }

    pub async fn add_toxic(&self, proxy: &str, toxic: &Toxic) -> Result<()> {
        let body = serde_json::to_value(toxic)?;
        self.send(Method::POST, &format!("/proxies/{}/toxics", proxy), Some(body))
            .await?;
        Ok(())
    }

    pub async fn remove_toxic(&self, proxy: &str, toxic: &str) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("/proxies/{}/toxics/{}", proxy, toxic),
            None,
        )
        .await?;
        Ok(())
    }

    /// Re-enable every proxy and remove all toxics.
    pub async fn reset(&self) -> Result<()> {
        self.send(Method::POST, "/reset", None).await?;
        Ok(())
    }
}
