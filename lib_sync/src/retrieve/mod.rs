//! # Data Retrieval Module
//!
//! The client's view of the REST collaborator.
//!
//! ## Contained Modules:
//!
//! - **`api`**: wire types and the object-safe endpoint traits the core
//!   depends on.
//! - **`ky_http`**: a generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with retries and exponential backoff
//!   (feature `http`).
//! - **`backend`**: `HttpBackend`, the production implementation of every
//!   endpoint trait (feature `http`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Endpoint contracts.
pub mod api;
/// Generic HTTP API client with retry middleware.
#[cfg(feature = "http")]
pub mod ky_http;
/// REST backend.
#[cfg(feature = "http")]
pub mod backend;

// --- Public API Re-exports ---
pub use api::{AnalysisApi, AnalysisResult, ApiResult, NotificationApi, NotificationRecord, SectionApi, StructuredItem};
#[cfg(feature = "http")]
pub use backend::HttpBackend;
#[cfg(feature = "http")]
pub use ky_http::{ApiClient, ApiResponse};
