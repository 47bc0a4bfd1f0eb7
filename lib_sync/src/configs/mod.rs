//! # Configuration Modules
//!
//! Layered session configuration: defaults, JSON file, host overrides.

/// Session configuration layers and their resolution.
pub mod config_sync;

pub use config_sync::SyncConfig;
