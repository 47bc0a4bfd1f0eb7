//! # Derived-Result Cache Module
//!
//! Durable, signature-validated storage for expensive computed results and the
//! gate that keeps the analyzer from being called when a valid result exists.
//!
//! ## Contained Modules:
//! - **`storage`**: the single namespaced durable slot (file or memory).
//! - **`derived_cache`**: hit/stale/evict rules and `reconcile`.
//! - **`analysis_gate`**: cache-first access to `POST /analyze`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Durable backing slot.
pub mod storage;
/// The cache proper.
pub mod derived_cache;
/// Cache-first analyzer access.
pub mod analysis_gate;

// --- Public API Re-exports ---
pub use storage::{CacheStorage, FileStorage, MemoryStorage};
pub use derived_cache::{CacheEntry, DerivedResultCache, OwnerSignature, ReconcileReport};
pub use analysis_gate::{AnalysisGate, AnalysisSource, AnalysisView};
