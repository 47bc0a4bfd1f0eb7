//! Typed vocabulary of the realtime bus: event kinds with their dispatch table,
//! parsed links, watched subjects and the local event that is fanned out.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A record's workflow status changed.
    #[serde(alias = "status_change")]
    StatusChange,
    /// Someone commented.
    Comment,
    /// Administrator broadcast.
    Broadcast,
    /// Server-side failure worth showing.
    Error,
    /// Server-side warning.
    Warning,
    /// Any type missing from the dispatch table.
    #[serde(other)]
    Other,
}

/// Wire type string -> kind.
const DISPATCH_TABLE: &[(&str, EventKind)] = &[
    ("status-change", EventKind::StatusChange),
    ("status_change", EventKind::StatusChange),
    ("comment", EventKind::Comment),
    ("broadcast", EventKind::Broadcast),
    ("error", EventKind::Error),
    ("warning", EventKind::Warning),
];

impl EventKind {
    /// Every kind, for subscribe-to-all.
    pub const ALL: [EventKind; 6] = [
        EventKind::StatusChange,
        EventKind::Comment,
        EventKind::Broadcast,
        EventKind::Error,
        EventKind::Warning,
        EventKind::Other,
    ];

    /// Looks the declared wire type up in the dispatch table.
    pub fn classify(wire: &str) -> Self {
        let wire = wire.trim();
        DISPATCH_TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wire))
            .map(|(_, kind)| *kind)
            .unwrap_or(EventKind::Other)
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StatusChange => "status-change",
            EventKind::Comment => "comment",
            EventKind::Broadcast => "broadcast",
            EventKind::Error => "error",
            EventKind::Warning => "warning",
            EventKind::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity a view is displaying, e.g. `programs/42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    /// Collection segment, e.g. `programs`.
    pub collection: String,
    /// The entity id that follows the collection segment in a link.
    pub id: String,
}

impl Subject {
    /// Shorthand constructor.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// An opaque notification link broken into path segments and query pairs.
///
/// Accepts absolute URLs (`https://host/programs/4`), rooted paths
/// (`/programs/4/reports/9`) and hash routes (`#/programs/4`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    raw: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl Link {
    /// Parses a link. Never fails; unrecognizable input yields no segments.
    pub fn parse(raw: &str) -> Self {
        let mut rest = raw.trim();
        if let Some(idx) = rest.find("://") {
            let after_scheme = &rest[idx + 3..];
            rest = after_scheme.find('/').map(|i| &after_scheme[i..]).unwrap_or("");
        }
        let rest = rest.trim_start_matches('#');
        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, q),
            None => (rest, ""),
        };
        let query = query.split('#').next().unwrap_or("");

        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        let query = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        Self {
            raw: raw.to_owned(),
            segments,
            query,
        }
    }

    /// The link as received.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Id following `collection` in the path, or the `collection=` query value.
    pub fn id_for(&self, collection: &str) -> Option<&str> {
        self.segments
            .windows(2)
            .find(|w| w[0] == collection)
            .map(|w| w[1].as_str())
            .or_else(|| {
                self.query
                    .iter()
                    .find(|(k, _)| k == collection)
                    .map(|(_, v)| v.as_str())
            })
    }

    /// Whether the link points at `subject`.
    pub fn references(&self, subject: &Subject) -> bool {
        self.segments
            .windows(2)
            .any(|w| w[0] == subject.collection && w[1] == subject.id)
            || self
                .query
                .iter()
                .any(|(k, v)| *k == subject.collection && *v == subject.id)
    }
}

/// Generic, type-tagged event re-emitted by the bus to local subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEvent {
    /// Classified kind.
    pub kind: EventKind,
    /// Type string exactly as pushed.
    pub wire_type: String,
    /// Id of the stored notification.
    pub notification_id: String,
    /// Human readable text.
    pub message: String,
    /// Parsed subject link.
    pub link: Option<Link>,
    /// Server creation time.
    pub created_at: DateTime<Utc>,
}

impl LocalEvent {
    /// The subscriber-side filter: does this event concern `subject`?
    pub fn pertains_to(&self, subject: &Subject) -> bool {
        self.link.as_ref().is_some_and(|l| l.references(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_table_classifies_known_and_unknown_types() {
        assert_eq!(EventKind::classify("status-change"), EventKind::StatusChange);
        assert_eq!(EventKind::classify("status_change"), EventKind::StatusChange);
        assert_eq!(EventKind::classify("Comment"), EventKind::Comment);
        assert_eq!(EventKind::classify("broadcast"), EventKind::Broadcast);
        assert_eq!(EventKind::classify("error"), EventKind::Error);
        assert_eq!(EventKind::classify("warning"), EventKind::Warning);
        assert_eq!(EventKind::classify("audit-scheduled"), EventKind::Other);
    }

    #[test]
    fn serde_uses_wire_names_and_tolerates_unknown() {
        assert_eq!(serde_json::to_string(&EventKind::StatusChange).unwrap(), "\"status-change\"");
        let k: EventKind = serde_json::from_str("\"status_change\"").unwrap();
        assert_eq!(k, EventKind::StatusChange);
        let k: EventKind = serde_json::from_str("\"something-new\"").unwrap();
        assert_eq!(k, EventKind::Other);
    }

    #[test]
    fn links_reference_subjects() {
        let link = Link::parse("/programs/42/reports/7");
        assert!(link.references(&Subject::new("programs", "42")));
        assert!(link.references(&Subject::new("reports", "7")));
        assert!(!link.references(&Subject::new("programs", "7")));
        assert_eq!(link.id_for("programs"), Some("42"));
    }

    #[test]
    fn absolute_and_hash_links_parse() {
        let abs = Link::parse("https://app.example.org/programs/5?tab=insights");
        assert_eq!(abs.id_for("programs"), Some("5"));

        let hash = Link::parse("#/reports/9");
        assert_eq!(hash.segments(), &["reports".to_string(), "9".to_string()]);

        let query = Link::parse("/dashboard?programs=11");
        assert!(query.references(&Subject::new("programs", "11")));
    }

    #[test]
    fn event_without_link_pertains_to_nothing() {
        let ev = LocalEvent {
            kind: EventKind::Broadcast,
            wire_type: "broadcast".into(),
            notification_id: "n1".into(),
            message: "Maintenance tonight".into(),
            link: None,
            created_at: Utc::now(),
        };
        assert!(!ev.pertains_to(&Subject::new("programs", "1")));
    }
}
