//! Platform API client
//!
//! A thin wrapper over `reqwest::Client` that prefixes the base URL, adds the
//! bearer token and turns non-success statuses into [`GatewayError`]s.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lcsync_remote::client::GatewayClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), lcsync_remote::GatewayError> {
//! let client = GatewayClient::with_base_url("token", "https://dev.platform.example/api");
//! let record = client.get_json("/entities/class/c-1").await?;
//! println!("{}", record["identifier"]);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::GatewayError;

/// HTTP client for the platform entity API
#[derive(Clone)]
pub struct GatewayClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL without a trailing slash
    base_url: String,
    /// Bearer token sent with every request
    access_token: String,
}

impl GatewayClient {
    /// Creates a client for `base_url` with a per-request timeout
    pub fn new(
        base_url: &Url,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// Creates a client with default settings against a custom base URL
    /// (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for `path`
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path relative to the base URL, starting with `/`
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Sends `request` and fails on any non-success status
    ///
    /// The response body of a failed call becomes the error message.
    pub async fn send(
        &self,
        request: RequestBuilder,
        description: &str,
    ) -> Result<Response, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(%status, "{description}");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(%status, body = %body, "{description} failed");
        let message = if body.trim().is_empty() {
            description.to_string()
        } else {
            body
        };
        Err(GatewayError::from_status(status, message))
    }

    /// `GET path`, decoded as JSON
    pub async fn get_json(&self, path: &str) -> Result<Value, GatewayError> {
        let description = format!("GET {path}");
        let response = self
            .send(self.request(Method::GET, path), &description)
            .await?;
        decode(response, &description).await
    }

    /// `POST path` with a JSON body, response decoded as JSON
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let description = format!("POST {path}");
        let response = self
            .send(self.request(Method::POST, path).json(body), &description)
            .await?;
        decode(response, &description).await
    }

    /// `PATCH path` with a JSON body
    ///
    /// # Returns
    /// `None` for `204 No Content` or an empty body, the decoded body otherwise
    pub async fn patch_json(&self, path: &str, body: &Value) -> Result<Option<Value>, GatewayError> {
        let description = format!("PATCH {path}");
        let response = self
            .send(self.request(Method::PATCH, path).json(body), &description)
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| GatewayError::InvalidResponse(format!("{description}: {e}")))
    }
}

async fn decode(response: Response, description: &str) -> Result<Value, GatewayError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::InvalidResponse(format!("{description}: {e}")))
}
