//! REST implementation of the collaborator traits.

use async_trait::async_trait;
use reqwest::Method;

use crate::core::model::{SavedSection, SectionSnapshot};
use crate::errors::Result;
use crate::retrieve::api::{AnalysisApi, AnalysisResult, ApiResult, NotificationApi, NotificationRecord, SectionApi};
use crate::retrieve::ky_http::ApiClient;

/// Retries for idempotent endpoints.
const IDEMPOTENT_RETRIES: u32 = 3;

#[derive(serde::Serialize)]
struct AnalyzeRequest<'a> {
    #[serde(rename = "ownerId")]
    owner_id: &'a str,
}

/// Talks to the server over HTTP.
///
/// `POST /analyze` goes through a client without retry middleware; every
/// other endpoint is idempotent and retried on transient failures.
pub struct HttpBackend {
    client: ApiClient,
    analyze_client: ApiClient,
}

impl HttpBackend {
    /// Builds both clients for `base_url`.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(base_url, auth_token.clone(), IDEMPOTENT_RETRIES)?,
            analyze_client: ApiClient::new(base_url, auth_token, 0)?,
        })
    }

    async fn send_unit(&self, method: Method, path: &str) -> ApiResult<()> {
        self.client
            .request::<serde_json::Value, ()>(method, path, None, None)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl SectionApi for HttpBackend {
    async fn put_section(&self, id: &str, snapshot: &SectionSnapshot) -> ApiResult<SavedSection> {
        let path = format!("sections/{}", id);
        let resp = self
            .client
            .request::<SavedSection, _>(Method::PUT, &path, None, Some(snapshot))
            .await?;
        Ok(resp.data)
    }
}

#[async_trait]
impl AnalysisApi for HttpBackend {
    async fn analyze(&self, owner_id: &str) -> ApiResult<AnalysisResult> {
        let body = AnalyzeRequest { owner_id };
        let resp = self
            .analyze_client
            .request::<AnalysisResult, _>(Method::POST, "analyze", None, Some(&body))
            .await?;
        Ok(resp.data)
    }
}

#[async_trait]
impl NotificationApi for HttpBackend {
    async fn list(&self) -> ApiResult<Vec<NotificationRecord>> {
        let resp = self
            .client
            .request::<Vec<NotificationRecord>, ()>(Method::GET, "notifications", None, None)
            .await?;
        Ok(resp.data)
    }

    async fn mark_read(&self, id: &str) -> ApiResult<()> {
        self.send_unit(Method::POST, &format!("notifications/{}/read", id)).await
    }

    async fn mark_all_read(&self) -> ApiResult<()> {
        self.send_unit(Method::POST, "notifications/read-all").await
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        self.send_unit(Method::DELETE, &format!("notifications/{}", id)).await
    }

    async fn clear_all(&self) -> ApiResult<()> {
        self.send_unit(Method::DELETE, "notifications").await
    }
}
