//! Subscriber-side filtering. A view displaying one entity only reacts to
//! events whose link references that entity; everything else on the bus is
//! dropped here.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::derived_cache::DerivedResultCache;
use crate::realtime::bus::RealtimeBus;
use crate::realtime::channel::Subscription;
use crate::realtime::events::{EventKind, LocalEvent, Subject};

/// A subscription narrowed to one displayed entity.
pub struct SubjectWatcher {
    subscription: Subscription,
    subject: Subject,
}

impl SubjectWatcher {
    /// Watches `kinds` on `bus` for events about `subject`.
    pub fn new(bus: &RealtimeBus, kinds: &[EventKind], subject: Subject) -> Self {
        Self {
            subscription: bus.subscribe(kinds),
            subject,
        }
    }

    /// The entity currently watched.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Re-targets the watcher when the view switches entity.
    pub fn set_subject(&mut self, subject: Subject) {
        self.subject = subject;
    }

    /// Waits for the next event pertaining to the watched subject, skipping
    /// the rest. `None` once the bus is gone.
    pub async fn next_relevant(&mut self) -> Option<Arc<LocalEvent>> {
        loop {
            let event = self.subscription.recv().await?;
            if event.pertains_to(&self.subject) {
                return Some(event);
            }
            log::trace!("Event {} ignored by watcher of {}", event.notification_id, self.subject);
        }
    }

    /// Drains already-queued events, returning whether any was relevant.
    pub fn drain_relevant(&mut self) -> bool {
        let mut hit = false;
        while let Some(event) = self.subscription.try_recv() {
            hit |= event.pertains_to(&self.subject);
        }
        hit
    }
}

/// Evicts cache entries whose owner a `status-change` push references.
///
/// Owners are read from the `collection` segment of the event link
/// (e.g. `programs` for `/programs/42/...`). Runs until `shutdown` fires or
/// the bus is dropped.
pub fn spawn_cache_invalidator(
    bus: &RealtimeBus,
    cache: Arc<DerivedResultCache>,
    collection: impl Into<String>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut subscription = bus.subscribe(&[EventKind::StatusChange]);
    let collection = collection.into();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                ev = subscription.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            let Some(owner) = event.link.as_ref().and_then(|l| l.id_for(&collection)) else {
                continue;
            };
            if cache.invalidate(owner) {
                log::info!("Push {} invalidated cached analysis for {}", event.notification_id, owner);
            }
        }
        log::debug!("Cache invalidator for '{}' stopped", collection);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryStorage;
    use crate::core::fingerprint::fingerprint;
    use crate::realtime::notifications::NotificationStore;
    use crate::realtime::testing::QuietNotifications;
    use crate::retrieve::api::AnalysisResult;
    use std::time::Duration;

    fn bus() -> Arc<RealtimeBus> {
        RealtimeBus::new(Arc::new(NotificationStore::new(Arc::new(QuietNotifications))))
    }

    fn push(bus: &RealtimeBus, id: &str, kind: &str, link: &str) {
        let raw = format!(
            r#"{{"id":"{}","type":"{}","message":"","link":"{}","created_at":"2026-03-01T10:00:00Z"}}"#,
            id, kind, link
        );
        bus.ingest_frame(&raw).unwrap();
    }

    #[tokio::test]
    async fn watcher_skips_events_about_other_subjects() {
        let bus = bus();
        let mut watcher = SubjectWatcher::new(&bus, &[EventKind::StatusChange], Subject::new("programs", "B"));
        push(&bus, "n1", "status-change", "/programs/A");
        push(&bus, "n2", "status-change", "/programs/B/reports/3");

        let ev = watcher.next_relevant().await.unwrap();
        assert_eq!(ev.notification_id, "n2");
    }

    #[tokio::test]
    async fn drain_reports_relevance() {
        let bus = bus();
        let mut watcher = SubjectWatcher::new(&bus, &EventKind::ALL, Subject::new("programs", "B"));
        push(&bus, "n1", "comment", "/programs/A");
        assert!(!watcher.drain_relevant());
        watcher.set_subject(Subject::new("programs", "A"));
        push(&bus, "n2", "comment", "/programs/A");
        assert!(watcher.drain_relevant());
    }

    #[tokio::test(start_paused = true)]
    async fn status_change_evicts_only_the_referenced_owner() {
        let bus = bus();
        let cache = Arc::new(DerivedResultCache::open(MemoryStorage::new()));
        let result = AnalysisResult {
            analysis: "ok".into(),
            items: vec![],
        };
        cache.put("A", fingerprint(&1).unwrap(), result.clone());
        cache.put("B", fingerprint(&2).unwrap(), result);

        let shutdown = CancellationToken::new();
        let task = spawn_cache_invalidator(&bus, cache.clone(), "programs", shutdown.clone());

        push(&bus, "n1", "comment", "/programs/A");
        push(&bus, "n2", "status-change", "/programs/A");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(cache.get("A").is_none());
        assert!(cache.get("B").is_some());

        shutdown.cancel();
        task.await.unwrap();
    }
}
