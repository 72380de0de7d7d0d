//! Shoal HTTP Client
//!
//! TigerStyle: HTTP client for the Shoal server API with explicit error handling.
//!
//! The reconciler only sees the two traits below, so tests can stand in for
//! the server without a network.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use shoal_core::{Shape, ShapeKey};
use std::time::Duration;
use uuid::Uuid;

/// Index service calls the client needs
#[async_trait]
pub trait IndexApi: Send + Sync + 'static {
    /// Entity ids registered for `owner_id`
    async fn list_entities(&self, owner_id: Uuid) -> Result<Vec<Uuid>>;
}

/// Shape actor calls the client needs
#[async_trait]
pub trait ShapeApi: Send + Sync + 'static {
    /// Read the shape's position; the first call activates the actor
    async fn get_current_position(&self, key: ShapeKey) -> Result<Shape>;

    /// Stop the shape's `advance` reminder
    async fn unregister_reminder(&self, key: ShapeKey) -> Result<()>;
}

/// Shoal API client
#[derive(Clone)]
pub struct ShoalClient {
    client: reqwest::Client,
    base_url: String,
}

impl ShoalClient {
    /// Create a new client with the given base URL
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the push channel
    pub fn hub_url(&self) -> String {
        format!("{}/shapehub", self.base_url)
    }

    /// Get server health status
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    fn shape_path(key: &ShapeKey, action: &str) -> String {
        format!("/actors/shape/{}/{}/{}", key.owner_id, key.shape_id, action)
    }

    /// GET request helper
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        self.handle_response(response).await
    }

    /// POST helper for calls without a response body
    async fn post_empty(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Server returned error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ));
        }

        Ok(())
    }

    /// Handle response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Server returned error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ));
        }

        serde_json::from_str(&body).with_context(|| {
            format!(
                "Failed to parse response: {}",
                body.chars().take(100).collect::<String>()
            )
        })
    }
}

#[async_trait]
impl IndexApi for ShoalClient {
    async fn list_entities(&self, owner_id: Uuid) -> Result<Vec<Uuid>> {
        self.get(&format!("/entities/{}", owner_id)).await
    }
}

#[async_trait]
impl ShapeApi for ShoalClient {
    async fn get_current_position(&self, key: ShapeKey) -> Result<Shape> {
        self.get(&Self::shape_path(&key, "position")).await
    }

    async fn unregister_reminder(&self, key: ShapeKey) -> Result<()> {
        self.post_empty(&Self::shape_path(&key, "unregister-reminder"))
            .await
    }
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ShoalClient::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.hub_url(), "http://localhost:5000/shapehub");
    }

    #[test]
    fn test_shape_paths() {
        let key = ShapeKey::new(Uuid::nil(), Uuid::from_u128(1));
        assert_eq!(
            ShoalClient::shape_path(&key, "position"),
            format!("/actors/shape/{}/{}/position", Uuid::nil(), Uuid::from_u128(1))
        );
    }

    #[test]
    fn test_health_response_parses_camel_case() {
        let health: HealthResponse =
            serde_json::from_str(r#"{"status":"ok","version":"0.1.0","uptimeSeconds":12}"#)
                .unwrap();
        assert_eq!(health.uptime_seconds, 12);
    }
}
