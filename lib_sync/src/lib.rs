//! # lib_sync
//!
//! Client-side state synchronization for a collaborative reporting
//! application: deterministic content fingerprints, debounced autosave with a
//! serialized save state machine, a durable signature-validated cache for
//! expensive analysis results, and a single realtime push connection fanned
//! out to in-process subscribers.
//!
//! ## Feature flags
//! - `http`: `reqwest` backend for the REST collaborator.
//! - `ws`: WebSocket push transport.
//! - `loggers`: `fern` file + console logging setup.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Autosave engine.
pub mod core;
/// Derived-result cache.
pub mod cache;
/// Realtime bus and notifications.
pub mod realtime;
/// REST collaborator contracts and clients.
pub mod retrieve;
/// Session configuration.
pub mod configs;
/// Error types.
pub mod errors;
/// Session wiring.
pub mod session;

/// Logging setup.
#[cfg(feature = "loggers")]
pub mod loggers;

pub use errors::{ApiError, Result, SyncError};
pub use session::SyncSession;
