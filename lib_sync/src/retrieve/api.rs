//! # Collaborator Contracts
//!
//! The REST surface is owned by the server; the core only consumes it. Each
//! group of endpoints is a small object-safe trait so the core can run against
//! the HTTP backend in production and against in-memory fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model::{SavedSection, SectionSnapshot};
use crate::errors::ApiError;

/// Result type of a collaborator call.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// One line of the structured breakdown returned with an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredItem {
    /// Short heading (standard, criterion, area).
    pub label: String,
    /// Free-text finding.
    #[serde(default)]
    pub detail: String,
    /// Optional numeric rating attached by the analyzer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Response of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The narrative text produced by the analyzer.
    pub analysis: String,
    /// The structured breakdown, one item per standard or criterion.
    #[serde(default)]
    pub items: Vec<StructuredItem>,
}

/// A notification as listed by the server or pushed over the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// The server's id, stable across listings and pushes of the same notification.
    pub id: String,
    /// The declared type as sent on the wire, e.g. `status-change`. Kept raw
    /// here; classification happens when the record enters the bus or store.
    #[serde(rename = "type")]
    pub kind: String,
    /// The human readable text, empty when the server omits it.
    #[serde(default)]
    pub message: String,
    /// The opaque reference to the subject, e.g. `/programs/42/reports/7`.
    #[serde(default)]
    pub link: Option<String>,
    /// The server-side creation time, used to order the list newest first.
    pub created_at: DateTime<Utc>,
    /// Read time; absent means unread. Never present on pushed frames.
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// `PUT /sections/{id}`.
#[async_trait]
pub trait SectionApi: Send + Sync {
    /// Persists the section and returns the server's canonical copy.
    async fn put_section(&self, id: &str, snapshot: &SectionSnapshot) -> ApiResult<SavedSection>;
}

/// `POST /analyze`. Non-idempotent and slow; gate every call through the cache.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Runs the analysis for `owner_id`.
    async fn analyze(&self, owner_id: &str) -> ApiResult<AnalysisResult>;
}

/// Notification CRUD.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Lists the current user's notifications, newest first.
    async fn list(&self) -> ApiResult<Vec<NotificationRecord>>;
    /// Marks one notification read.
    async fn mark_read(&self, id: &str) -> ApiResult<()>;
    /// Marks every notification read.
    async fn mark_all_read(&self) -> ApiResult<()>;
    /// Deletes one notification.
    async fn delete(&self, id: &str) -> ApiResult<()>;
    /// Deletes every notification. Returns [`ApiError::Unsupported`] when the
    /// server has no bulk-clear endpoint.
    async fn clear_all(&self) -> ApiResult<()>;
}
