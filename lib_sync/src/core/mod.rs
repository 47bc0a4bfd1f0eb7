//! # Draft Autosave Engine
//!
//! Everything needed to keep one editable report section consistent with the
//! server while the user types:
//!
//! - **`fingerprint`**: the content signature shared with the result cache.
//! - **`model`**: sections, their status and the persisted snapshot shape.
//! - **`dirty_tracker`**: baseline vs. current signature per unit.
//! - **`autosave`**: debounce timer and the confirmation throttle.
//! - **`save_coordinator`**: the per-unit state machine that serializes manual
//!   and automatic saves and applies server responses as the new baseline.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Deterministic content signatures.
pub mod fingerprint;
/// Section data model.
pub mod model;
/// Baseline/current signature bookkeeping.
pub mod dirty_tracker;
/// Debounce timer and toast throttle.
pub mod autosave;
/// Serialized save state machine.
pub mod save_coordinator;

use std::sync::{Mutex, MutexGuard, PoisonError};

// --- Public API Re-exports ---
pub use fingerprint::{fingerprint, fingerprint_value, Signature};
pub use model::{FieldMap, SavedSection, SectionSnapshot, SectionStatus, UnitId};
pub use dirty_tracker::DirtyTracker;
pub use autosave::{AutosaveScheduler, SaveTrigger, ToastThrottle};
pub use save_coordinator::{
    AutosaveOptions, SaveCoordinator, SaveEvent, SaveMode, SaveOutcome, SaveState, SaveStatus, UnitPhase,
};

/// Locks a std mutex, recovering the data if a previous holder panicked.
/// Critical sections in this crate never leave data half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
