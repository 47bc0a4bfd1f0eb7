//! # HTTP Retrieval Utilities
//!
//! Asynchronous API client wrapper around `reqwest`, with middleware support
//! for exponential backoff retries and standardized JSON response handling.
//! Non-success statuses are classified into [`ApiError`] here, once.

use reqwest::{
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::errors::{ApiError, Result, SyncError};

/// A standardized container for API responses.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized response body. An empty body decodes as JSON `null`.
    pub data: T,
    /// The numeric HTTP status code.
    pub status: u16,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles the base URL, the bearer
/// token, and automatic retries of transient failures.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// An optional bearer token sent as the `Authorization` header.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client that retries transient failures up to `max_retries` times.
    ///
    /// # Arguments
    /// * `base_url` - Absolute base URL, e.g. `https://api.example.org/v1`.
    ///   A trailing slash is added when missing so relative paths join under it.
    /// * `auth_token` - Optional bearer token.
    /// * `max_retries` - `0` disables retrying, which non-idempotent endpoints need.
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, auth_token: Option<String>, max_retries: u32) -> Result<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let url = Url::parse(&normalized)
            .map_err(|e| SyncError::Config(format!("invalid api base url '{}': {}", base_url, e)))?;

        let mut builder = ClientBuilder::new(reqwest::Client::new());
        if max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            inner: builder.build(),
            base_url: url,
            auth_token,
        })
    }

    /// The base every path is joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL.
    pub fn url_for(&self, path: &str) -> std::result::Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Transport(format!("bad request path '{}': {}", path, e)))
    }

    /// Performs a request and decodes a successful body into `T`.
    ///
    /// # Errors
    /// - [`ApiError::Transport`] when no response was received.
    /// - [`ApiError::NotFound`], [`ApiError::Unsupported`] or [`ApiError::Status`]
    ///   for non-success statuses.
    /// - [`ApiError::Decode`] when the body does not match `T`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<&B>,
    ) -> std::result::Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        // Join the relative path onto the base URL
        let full_url = self.url_for(path)?;
        log::debug!("{} {}", method, full_url);
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        // Inject the bearer token if present
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        // Serialize the body as JSON if provided
        if let Some(b) = body {
            let json_body = serde_json::to_string(b).map_err(|e| ApiError::Decode(e.to_string()))?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        // Execute the request through the middleware stack
        let response: reqwest::Response = req.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if !status.is_success() {
            let error_text = response.text().await.ok();
            log::debug!("Request failed with status {}", status);
            return Err(ApiError::from_status(status.as_u16(), error_text));
        }

        // An empty success body (204, bare 200) decodes as `null`
        let text = response.text().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let raw = if text.trim().is_empty() { "null" } else { text.as_str() };
        let data = serde_json::from_str::<T>(raw).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(ApiResponse {
            data,
            status: status.as_u16(),
            headers: resp_headers,
        })
    }
}
