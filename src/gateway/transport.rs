use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ApiConfig;
use crate::models::{ApiRequest, ApiResponse};

/// Moves an [`ApiRequest`] over the wire.
///
/// Any HTTP status is a successful transport; `Err` is reserved for calls that
/// produced no response at all.
#[async_trait]
pub trait Transport: Send + Sync {
    fn get_name(&self) -> &str;
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, String>;
}

/// HTTP transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_in_ms))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(ReqwestTransport {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn get_name(&self) -> &str {
        "reqwest"
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, String> {
        let url = self.url_for(&request.path);
        debug!(request_id = %request.id, method = %request.method, %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| format!("Failed to call {}: {}", url, e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Failed to read response body from {}: {}", url, e))?;

        debug!(request_id = %request.id, status = status.as_u16(), "Received response");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
