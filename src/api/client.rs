//! HTTP client for the Step Up Naija REST API.
//!
//! All requests include an `X-Client-Type` header so the backend can tell
//! replayed offline traffic from the web app.

use std::time::Duration;

use reqwest::Client;

use super::types::{HttpMethod, NetworkRequest, NetworkResponse};
use super::Network;
use crate::error::NetworkError;

/// Client type header value sent with every request.
const CLIENT_TYPE: &str = "cli";

/// reqwest-backed [`Network`] implementation.
///
/// Relative targets are resolved against `base_url`; absolute `http(s)://`
/// targets are used as-is.
pub struct ApiClient {
    client: Client,
    base_url: String,
    health_path: String,
}

impl ApiClient {
    /// Create a new API client with the given base URL.
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_path: "/health".to_string(),
        }
    }

    /// Path hit by [`Network::probe`].
    pub fn with_health_path(mut self, path: &str) -> Self {
        self.health_path = path.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turn a target into a full URL.
    pub fn resolve(&self, target: &str) -> Result<String, NetworkError> {
        if target.starts_with("http://") || target.starts_with("https://") {
            return Ok(target.to_string());
        }
        if !target.starts_with('/') {
            return Err(NetworkError::InvalidTarget(target.to_string()));
        }
        Ok(format!("{}{}", self.base_url, target))
    }

    fn builder(&self, method: HttpMethod, url: &str) -> reqwest::RequestBuilder {
        let builder = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        builder.header("X-Client-Type", CLIENT_TYPE)
    }
}

impl Network for ApiClient {
    async fn execute(&self, request: &NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        let url = self.resolve(&request.target)?;
        let mut builder = self.builder(request.method, &url);

        if request.method.carries_body() {
            // .json() sets Content-Type: application/json
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        }

        log::debug!("{} {}", request.method.as_str(), url);
        let resp = builder
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| NetworkError::Transport(format!("failed to read response body: {}", e)))?;
        Ok(NetworkResponse::new(status, NetworkResponse::decode_body(&text)))
    }

    async fn probe(&self) -> bool {
        let url = match self.resolve(&self.health_path) {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.builder(HttpMethod::Get, &url).send().await {
            // Any HTTP answer means the server is reachable.
            Ok(_) => true,
            Err(e) => {
                log::debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}
