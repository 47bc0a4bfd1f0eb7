//! Shared data model: editable report sections and the snapshots that travel
//! to and from the section endpoint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name -> text. Ordered so snapshots serialize deterministically.
pub type FieldMap = BTreeMap<String, String>;

/// Review status of a section. Owned by the section and persisted through the
/// same request as its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Work in progress, the initial state.
    #[default]
    Draft,
    /// Being filled in.
    InProgress,
    /// Handed over to a reviewer.
    ReadyForReview,
    /// Signed off.
    Approved,
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionStatus::Draft => "draft",
            SectionStatus::InProgress => "in_progress",
            SectionStatus::ReadyForReview => "ready_for_review",
            SectionStatus::Approved => "approved",
        };
        f.write_str(s)
    }
}

/// The persistable part of a section, and the exact value that is fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SectionSnapshot {
    /// The text of every editable field, keyed by field name. Ordered, so
    /// two snapshots with the same fields always serialize the same way.
    pub content: FieldMap,
    /// The review status. Changing it makes the unit dirty like a text edit.
    #[serde(default)]
    pub status: SectionStatus,
}

impl SectionSnapshot {
    /// Builds a snapshot from `(field, text)` pairs.
    pub fn from_fields<I, K, V>(fields: I, status: SectionStatus) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            content: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            status,
        }
    }
}

/// Canonical section object returned by `PUT /sections/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSection {
    /// Section id.
    pub id: String,
    /// Parent document id.
    #[serde(default, rename = "ownerId", alias = "owner_id")]
    pub owner_id: Option<String>,
    /// Field texts as stored by the server.
    pub content: FieldMap,
    /// Status as stored by the server.
    #[serde(default)]
    pub status: SectionStatus,
}

impl SavedSection {
    /// The signature-comparable part of the server response.
    pub fn snapshot(&self) -> SectionSnapshot {
        SectionSnapshot {
            content: self.content.clone(),
            status: self.status,
        }
    }
}

/// Identity of an editable unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitId {
    /// Section id.
    pub id: String,
    /// Parent document id.
    pub owner_id: String,
}

impl UnitId {
    /// Shorthand constructor.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.id)
    }
}
