//! # Error Types
//!
//! Every fallible operation in the crate returns [`SyncError`]. Failures coming
//! back from the REST collaborator are classified once, as [`ApiError`], so the
//! callers can make decisions (a `404` on delete means "already gone") without
//! parsing strings.

use thiserror::Error;

/// Classified failure of a collaborator endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The addressed record does not exist (HTTP 404).
    #[error("Resource not found")]
    NotFound,

    /// The endpoint is not offered by this server (HTTP 405 / 501).
    #[error("Endpoint not supported by the server")]
    Unsupported,

    /// Any other non-success status.
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// The numeric HTTP status code.
        status: u16,
        /// The raw error body, possibly empty.
        body: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("Network error: {0}")]
    Transport(String),

    /// The response arrived but its body could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the server reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    /// Maps a non-success HTTP status into its class.
    pub fn from_status(status: u16, body: Option<String>) -> Self {
        match status {
            404 => ApiError::NotFound,
            405 | 501 => ApiError::Unsupported,
            _ => ApiError::Status {
                status,
                body: body.unwrap_or_default(),
            },
        }
    }
}

/// Errors surfaced by the synchronization core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A value could not be reduced to a signature.
    #[error("Fingerprint error: {0}")]
    Fingerprint(String),

    /// A collaborator endpoint failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Durable storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// A payload (push frame, stored document) could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A second push transport was attached to a bus that already has one.
    #[error("Realtime bus already has a live connection")]
    AlreadyConnected,

    /// The owning view was torn down before the operation completed.
    #[error("Editable unit has been disposed")]
    Disposed,

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SyncError>;
