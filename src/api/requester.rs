//! Transport seam between the action layer and the HTTP API.
//!
//! The [`Requester`] trait is the only thing the rest of the crate knows
//! about HTTP. [`HttpRequester`] is the production implementation on top of
//! `reqwest`; tests substitute a mock.

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ApiError, Result};

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://napi.arvancloud.ir";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A single call to issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`.
    pub endpoint: String,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
}

/// Raw answer from the provider, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// Error envelope the provider uses on failures.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

/// Issues calls against the IaaS API.
///
/// Implementations return `Ok` for every HTTP response regardless of status
/// and reserve `Err` for calls that could not be completed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Requester: Send + Sync {
    /// Issues one call and waits for its response.
    async fn issue(&self, request: ApiRequest) -> Result<RawResponse>;
}

impl ApiRequest {
    /// Creates a POST request.
    #[must_use]
    pub fn post(endpoint: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::POST,
            endpoint: endpoint.into(),
            body,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            endpoint: endpoint.into(),
            body: None,
        }
    }
}

impl RawResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Turns a non-success response into a remote rejection.
    ///
    /// # Errors
    ///
    /// Returns `RemoteRejected` carrying the provider's message when the
    /// status is not 2xx.
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let message = serde_json::from_str::<ErrorEnvelope>(&self.body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(self.body);

        Err(ApiError::rejected(self.status, message).into())
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the body does not match `T`.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ApiError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            }
            .into()
        })
    }
}

/// `reqwest`-backed [`Requester`].
#[derive(Debug, Clone)]
pub struct HttpRequester {
    /// HTTP client.
    client: Client,
    /// API base URL without trailing slash.
    base_url: String,
    /// API key.
    api_key: String,
}

impl HttpRequester {
    /// Creates a requester with a custom base URL and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_options(api_key: &str, base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn issue(&self, request: ApiRequest) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, request.endpoint);
        debug!("{} {}", request.method, request.endpoint);

        let mut builder = self
            .client
            .request(request.method, &url)
            .header(header::AUTHORIZATION, format!("Apikey {}", self.api_key))
            .header(header::ACCEPT, "application/json");

        if let Some(body) = &request.body {
            trace!("Request body: {body}");
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("Request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::transport(format!("Failed to read response body: {e}")))?;

        trace!("Response {status}: {body}");
        Ok(RawResponse { status, body })
    }
}
