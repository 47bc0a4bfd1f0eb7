//! # Dirty Tracker
//!
//! Per-section record of what is on screen versus what the server last
//! confirmed. The unit is dirty exactly when the two signatures differ; there
//! is no separate flag that could drift.

use crate::core::fingerprint::{fingerprint, Signature};
use crate::core::model::{FieldMap, SectionSnapshot, SectionStatus, UnitId};
use crate::errors::Result;

/// In-memory state of one editable unit.
#[derive(Debug, Clone)]
pub struct DirtyTracker {
    unit: UnitId,
    current: SectionSnapshot,
    current_signature: Signature,
    baseline: SectionSnapshot,
    baseline_signature: Signature,
}

impl DirtyTracker {
    /// Starts tracking a unit whose `loaded` state is known to be persisted.
    pub fn new(unit: UnitId, loaded: SectionSnapshot) -> Result<Self> {
        let signature = fingerprint(&loaded)?;
        Ok(Self {
            unit,
            current: loaded.clone(),
            current_signature: signature.clone(),
            baseline: loaded,
            baseline_signature: signature,
        })
    }

    /// Identity of the tracked unit.
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    /// The content as currently edited.
    pub fn snapshot(&self) -> &SectionSnapshot {
        &self.current
    }

    /// Signature of the current content.
    pub fn current_signature(&self) -> &Signature {
        &self.current_signature
    }

    /// Signature of the last confirmed persisted content.
    pub fn baseline_signature(&self) -> &Signature {
        &self.baseline_signature
    }

    /// True when local content differs from the last persisted content.
    pub fn is_dirty(&self) -> bool {
        self.current_signature != self.baseline_signature
    }

    /// Sets one field's text. Returns the resulting dirtiness.
    pub fn edit_field(&mut self, field: &str, text: &str) -> Result<bool> {
        let mut next = self.current.clone();
        next.content.insert(field.to_owned(), text.to_owned());
        self.apply(next)
    }

    /// Changes the review status. Persisted like any content edit.
    pub fn set_status(&mut self, status: SectionStatus) -> Result<bool> {
        let mut next = self.current.clone();
        next.status = status;
        self.apply(next)
    }

    /// Replaces every field at once (paste, template fill).
    pub fn replace_content(&mut self, content: FieldMap) -> Result<bool> {
        let next = SectionSnapshot {
            content,
            status: self.current.status,
        };
        self.apply(next)
    }

    /// Throws local edits away and returns to the persisted content.
    pub fn restore(&mut self) {
        self.current = self.baseline.clone();
        self.current_signature = self.baseline_signature.clone();
    }

    /// Records a successful save of the content whose signature was `attempted`.
    ///
    /// The server's canonical copy becomes the new baseline. When nothing was
    /// edited while the request was in flight, the local content also adopts the
    /// server copy; otherwise the newer local edits are kept and the unit stays
    /// dirty against them. Returns the resulting dirtiness.
    pub fn accept_saved(&mut self, attempted: &Signature, saved: SectionSnapshot) -> Result<bool> {
        let saved_signature = fingerprint(&saved)?;
        if &self.current_signature == attempted {
            self.current = saved.clone();
            self.current_signature = saved_signature.clone();
        }
        self.baseline = saved;
        self.baseline_signature = saved_signature;
        Ok(self.is_dirty())
    }

    fn apply(&mut self, next: SectionSnapshot) -> Result<bool> {
        let signature = fingerprint(&next)?;
        self.current = next;
        self.current_signature = signature;
        Ok(self.is_dirty())
    }
}
