//! # Logging Setup
//!
//! The library itself only talks to the `log` facade. Host binaries call
//! [`setup_logging`] once to route records to stdout and a rotating file.

/// `fern` dispatcher installation and log file rotation.
pub mod setup;

pub use setup::{cleanup_old_logs, parse_level, setup_logging};
