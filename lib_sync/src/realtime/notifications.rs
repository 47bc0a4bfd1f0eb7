//! # Notification Store
//!
//! The user-facing list of notifications. Pushed events are prepended by the
//! bus, the list is refreshed from `GET /notifications`, and the user can mark
//! read, delete or clear.
//!
//! Rules:
//! - Every mutating call reaches the server first and only then changes the
//!   local list, so a failed call leaves the list untouched. `clear_all` is the
//!   exception: the local list is emptied even when some server deletes fail.
//! - Every local mutation bumps a version stamp. While a refresh is in flight
//!   the store also journals its mutations; when the response arrives the
//!   journal entries newer than the refresh's starting stamp are replayed on
//!   top of it. A slow list response therefore never resurrects deleted
//!   entries, never undoes a mark-read, and never hides a push that landed
//!   meanwhile.
//! - The unread count is always derived from the list.
//! - Ephemeral entries (local client errors) never touch the server.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::core::lock;
use crate::errors::{ApiError, Result};
use crate::realtime::events::EventKind;
use crate::retrieve::api::{NotificationApi, NotificationRecord};

/// A notification as displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// The server's id for this notification, or a `local-<uuid>` id for
    /// entries that only exist on this client.
    pub id: String,
    /// The classified type; unknown wire types become [`EventKind::Other`].
    pub kind: EventKind,
    /// The human readable text shown in the list.
    pub message: String,
    /// The opaque reference to the subject, e.g. `/programs/42/reports/7`.
    pub link: Option<String>,
    /// When the server (or, for ephemeral entries, this client) created it.
    pub created_at: DateTime<Utc>,
    /// When it was read; `None` while unread.
    pub read_at: Option<DateTime<Utc>>,
    /// Set for local-only entries, which never call the server.
    #[serde(default)]
    pub ephemeral: bool,
}

impl NotificationEvent {
    /// Builds a display entry from a listed or pushed server record.
    pub fn from_record(record: NotificationRecord) -> Self {
        Self {
            kind: EventKind::classify(&record.kind),
            id: record.id,
            message: record.message,
            link: record.link,
            created_at: record.created_at,
            read_at: record.read_at,
            ephemeral: false,
        }
    }

    /// A local-only entry with a fresh id.
    pub fn ephemeral(kind: EventKind, message: impl Into<String>, link: Option<String>) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            kind,
            message: message.into(),
            link,
            created_at: Utc::now(),
            read_at: None,
            ephemeral: true,
        }
    }

    /// True while unread.
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Result of [`NotificationStore::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The list was replaced; carries the number of server entries.
    Applied(usize),
    /// Local changes happened while the request was in flight and were
    /// replayed on top of the server's list.
    Merged {
        /// Number of server entries in the response.
        fetched: usize,
        /// Number of local changes replayed.
        replayed: usize,
    },
}

/// Per-item tally of a [`NotificationStore::clear_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// The server's bulk endpoint handled everything.
    pub bulk: bool,
    /// Items deleted one by one.
    pub deleted: usize,
    /// Items the server no longer had (404), counted as success.
    pub already_gone: usize,
    /// Items whose server delete failed, with the error text. They are gone
    /// from the local list anyway; the next refresh brings them back.
    pub failed: Vec<(String, String)>,
}

impl ClearReport {
    /// True when nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A local mutation, journaled while a refresh is in flight.
#[derive(Debug, Clone)]
enum Change {
    Added(NotificationEvent),
    Removed(HashSet<String>),
    Read(String, DateTime<Utc>),
    ReadAll(DateTime<Utc>),
}

impl Change {
    fn replay(&self, entries: &mut Vec<NotificationEvent>) {
        match self {
            Change::Added(event) => {
                if !entries.iter().any(|e| e.id == event.id) {
                    entries.insert(0, event.clone());
                }
            }
            Change::Removed(ids) => entries.retain(|e| !ids.contains(&e.id)),
            Change::Read(id, at) => {
                if let Some(entry) = entries.iter_mut().find(|e| e.id == *id && e.is_unread()) {
                    entry.read_at = Some(*at);
                }
            }
            Change::ReadAll(at) => {
                for entry in entries.iter_mut().filter(|e| e.is_unread()) {
                    entry.read_at = Some(*at);
                }
            }
        }
    }
}

#[derive(Default)]
struct StoreState {
    entries: Vec<NotificationEvent>,
    version: u64,
    refreshing: usize,
    journal: Vec<(u64, Change)>,
}

impl StoreState {
    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Journals `change` under the stamp the enclosing mutation is about to take.
    fn note(&mut self, change: Change) {
        if self.refreshing > 0 {
            self.journal.push((self.version + 1, change));
        }
    }
}

/// Keeps the journal alive for the lifetime of one refresh, including one
/// whose future is dropped mid-flight.
struct RefreshGuard<'a> {
    state: &'a Mutex<StoreState>,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.refreshing = state.refreshing.saturating_sub(1);
        if state.refreshing == 0 {
            state.journal.clear();
        }
    }
}

/// Notification list bound to the server's notification endpoints.
pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    state: Mutex<StoreState>,
    changes: watch::Sender<u64>,
}

impl NotificationStore {
    /// Empty store. Call [`refresh`](Self::refresh) to load.
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            api,
            state: Mutex::new(StoreState::default()),
            changes,
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> Option<R>) -> Option<R> {
        let mut state = lock(&self.state);
        let out = f(&mut state);
        if out.is_some() {
            let version = state.bump();
            self.changes.send_replace(version);
        }
        out
    }

    /// Snapshot of the list, newest first.
    pub fn entries(&self) -> Vec<NotificationEvent> {
        lock(&self.state).entries.clone()
    }

    /// Looks one entry up.
    pub fn get(&self, id: &str) -> Option<NotificationEvent> {
        lock(&self.state).entries.iter().find(|e| e.id == id).cloned()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// True when the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of unread entries.
    pub fn unread_count(&self) -> usize {
        lock(&self.state).entries.iter().filter(|e| e.is_unread()).count()
    }

    /// Current version stamp.
    pub fn version(&self) -> u64 {
        lock(&self.state).version
    }

    /// Observes the version stamp; changes on every local mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Inserts at the head of the list. Returns `false` when an entry with the
    /// same id is already present (a push replayed after a refresh).
    pub fn prepend(&self, event: NotificationEvent) -> bool {
        self.mutate(|state| {
            if state.entries.iter().any(|e| e.id == event.id) {
                return None;
            }
            state.note(Change::Added(event.clone()));
            state.entries.insert(0, event);
            Some(())
        })
        .is_some()
    }

    /// Adds a local-only entry, typically a client error surfaced to the user.
    pub fn push_ephemeral(&self, kind: EventKind, message: impl Into<String>, link: Option<String>) -> NotificationEvent {
        let event = NotificationEvent::ephemeral(kind, message, link);
        self.prepend(event.clone());
        event
    }

    /// Replaces the server-backed entries with the server's list. Ephemeral
    /// entries survive and everything stays ordered by creation time.
    ///
    /// Local changes made while the request was in flight (pushes, reads,
    /// deletes, clears) are replayed on top of the response.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        // 1. Take the starting stamp and open the journal.
        let (started, _guard) = {
            let mut state = lock(&self.state);
            state.refreshing += 1;
            (state.version, RefreshGuard { state: &self.state })
        };

        // 2. Fetch. An error leaves the list as it was.
        let records = self.api.list().await?;
        let fetched: Vec<NotificationEvent> = records.into_iter().map(NotificationEvent::from_record).collect();
        let count = fetched.len();

        // 3. Server list plus surviving ephemeral entries, then the journal.
        let outcome = self.mutate(|state| {
            let mut merged: Vec<NotificationEvent> =
                state.entries.iter().filter(|e| e.ephemeral).cloned().collect();
            merged.extend(fetched);

            let mut replayed = 0;
            for (_, change) in state.journal.iter().filter(|(v, _)| *v > started) {
                change.replay(&mut merged);
                replayed += 1;
            }

            merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            state.entries = merged;
            Some(match replayed {
                0 => RefreshOutcome::Applied(count),
                n => RefreshOutcome::Merged { fetched: count, replayed: n },
            })
        });

        let outcome = outcome.unwrap_or(RefreshOutcome::Applied(count));
        match outcome {
            RefreshOutcome::Applied(n) => log::debug!("Notification list refreshed with {} entries", n),
            RefreshOutcome::Merged { fetched, replayed } => log::debug!(
                "Notification list refreshed with {} entries, {} local changes replayed",
                fetched,
                replayed
            ),
        }
        Ok(outcome)
    }

    /// Marks one entry read. Returns `false` if it is unknown or already read.
    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        let Some(entry) = self.get(id) else {
            return Ok(false);
        };
        if !entry.is_unread() {
            return Ok(false);
        }
        if !entry.ephemeral {
            self.api.mark_read(id).await?;
        }
        let now = Utc::now();
        Ok(self
            .mutate(|state| {
                let entry = state.entries.iter_mut().find(|e| e.id == id && e.is_unread())?;
                entry.read_at = Some(now);
                state.note(Change::Read(id.to_string(), now));
                Some(())
            })
            .is_some())
    }

    /// Marks every entry read. Returns how many changed.
    pub async fn mark_all_read(&self) -> Result<usize> {
        let needs_server = lock(&self.state).entries.iter().any(|e| !e.ephemeral && e.is_unread());
        if needs_server {
            self.api.mark_all_read().await?;
        }
        let now = Utc::now();
        Ok(self
            .mutate(|state| {
                let mut changed = 0;
                for entry in state.entries.iter_mut().filter(|e| e.is_unread()) {
                    entry.read_at = Some(now);
                    changed += 1;
                }
                if changed > 0 {
                    state.note(Change::ReadAll(now));
                }
                (changed > 0).then_some(changed)
            })
            .unwrap_or(0))
    }

    /// Deletes one entry. A server 404 counts as success. Returns whether a
    /// local entry was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let ephemeral = self.get(id).is_some_and(|e| e.ephemeral);
        if !ephemeral {
            match self.api.delete(id).await {
                Ok(()) => {}
                Err(ApiError::NotFound) => log::debug!("Notification {} already gone on the server", id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.remove_local(HashSet::from([id.to_string()])) > 0)
    }

    /// Removes `ids` from the list; returns how many entries went away.
    fn remove_local(&self, ids: HashSet<String>) -> usize {
        self.mutate(|state| {
            let before = state.entries.len();
            state.entries.retain(|e| !ids.contains(&e.id));
            let removed = before - state.entries.len();
            if removed > 0 {
                state.note(Change::Removed(ids));
            }
            (removed > 0).then_some(removed)
        })
        .unwrap_or(0)
    }

    /// Deletes everything that is listed when the call starts.
    ///
    /// Tries the bulk endpoint first; if the server lacks it (or it fails) the
    /// server-backed entries are deleted one by one, where a 404 counts as
    /// already gone. The local list is cleared regardless of failures, which
    /// are reported in [`ClearReport::failed`]. Entries that arrive while the
    /// server calls are pending are kept.
    pub async fn clear_all(&self) -> ClearReport {
        // 1. Snapshot what the user asked to clear.
        let (listed, server_ids): (HashSet<String>, Vec<String>) = {
            let state = lock(&self.state);
            (
                state.entries.iter().map(|e| e.id.clone()).collect(),
                state.entries.iter().filter(|e| !e.ephemeral).map(|e| e.id.clone()).collect(),
            )
        };

        // 2. Server side: bulk, else one by one.
        let mut report = ClearReport::default();
        if !server_ids.is_empty() {
            match self.api.clear_all().await {
                Ok(()) => report.bulk = true,
                Err(e) => {
                    match e {
                        ApiError::Unsupported | ApiError::NotFound => {
                            log::info!("Bulk clear not offered by the server, deleting {} items one by one", server_ids.len());
                        }
                        other => {
                            log::warn!("Bulk clear failed ({}), deleting items one by one", other);
                        }
                    }
                    for id in &server_ids {
                        match self.api.delete(id).await {
                            Ok(()) => report.deleted += 1,
                            Err(ApiError::NotFound) => report.already_gone += 1,
                            Err(e) => {
                                log::warn!("Failed to delete notification {}: {}", id, e);
                                report.failed.push((id.clone(), e.to_string()));
                            }
                        }
                    }
                }
            }
        }
        if !report.is_complete() {
            log::warn!("{} notifications could not be deleted on the server; cleared locally", report.failed.len());
        }

        // 3. Local side: drop the snapshot, keep late arrivals.
        self.remove_local(listed);
        report
    }
}
