//! # Local Event Channel
//!
//! Fan-out of classified events to in-process subscribers. The observer list is
//! keyed by [`EventKind`]; each subscriber owns an unbounded MPSC receiver and
//! every delivery hands it an `Arc` to the same event, so no event is cloned
//! per subscriber.
//!
//! A dropped [`Subscription`] is pruned lazily: the next publish whose send
//! fails removes the handle with `retain`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::core::lock;
use crate::realtime::events::{EventKind, LocalEvent};

struct SubscriberHandle {
    id: u64,
    sender: mpsc::UnboundedSender<Arc<LocalEvent>>,
}

/// Observer list keyed by event kind.
#[derive(Default)]
pub struct EventChannel {
    subscribers: Mutex<HashMap<EventKind, Vec<SubscriberHandle>>>,
    next_id: AtomicU64,
}

impl EventChannel {
    /// Empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `kinds`. An empty slice subscribes to nothing.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = lock(&self.subscribers);
        let mut registered: Vec<EventKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if registered.contains(kind) {
                continue;
            }
            subscribers.entry(*kind).or_default().push(SubscriberHandle {
                id,
                sender: tx.clone(),
            });
            registered.push(*kind);
        }
        log::debug!("Subscriber {} registered for {:?}", id, registered);

        Subscription { id, rx }
    }

    /// Registers interest in every kind, `Other` included.
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(&EventKind::ALL)
    }

    /// Delivers `event` to every live subscriber of its kind and returns how
    /// many received it.
    pub fn publish(&self, event: Arc<LocalEvent>) -> usize {
        let mut subscribers = lock(&self.subscribers);
        let Some(list) = subscribers.get_mut(&event.kind) else {
            return 0;
        };

        let mut delivered = 0;
        list.retain(|handle| match handle.sender.send(Arc::clone(&event)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                log::debug!("Subscriber {} dropped. Removing from {} list.", handle.id, event.kind);
                false
            }
        });
        delivered
    }

    /// Removes a subscriber from every list.
    pub fn unsubscribe(&self, id: u64) {
        let mut subscribers = lock(&self.subscribers);
        for list in subscribers.values_mut() {
            list.retain(|handle| handle.id != id);
        }
    }

    /// Number of registered handles for `kind`, including dropped ones not yet pruned.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.subscribers).get(&kind).map_or(0, Vec::len)
    }
}

/// Receiving end handed to a subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Arc<LocalEvent>>,
}

impl Subscription {
    /// Handle id, for [`EventChannel::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event. `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<Arc<LocalEvent>> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Arc<LocalEvent>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(kind: EventKind, id: &str) -> Arc<LocalEvent> {
        Arc::new(LocalEvent {
            kind,
            wire_type: kind.as_str().to_string(),
            notification_id: id.to_string(),
            message: String::new(),
            link: None,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn delivers_only_to_matching_kinds() {
        let channel = EventChannel::new();
        let mut status = channel.subscribe(&[EventKind::StatusChange]);
        let mut comments = channel.subscribe(&[EventKind::Comment]);

        assert_eq!(channel.publish(event(EventKind::StatusChange, "n1")), 1);
        assert_eq!(status.try_recv().unwrap().notification_id, "n1");
        assert!(comments.try_recv().is_none());
    }

    #[test]
    fn subscribers_share_the_same_event() {
        let channel = EventChannel::new();
        let mut a = channel.subscribe_all();
        let mut b = channel.subscribe(&[EventKind::Broadcast]);

        channel.publish(event(EventKind::Broadcast, "n1"));
        let ea = a.try_recv().unwrap();
        let eb = b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&ea, &eb));
    }

    #[test]
    fn duplicate_kinds_deliver_once() {
        let channel = EventChannel::new();
        let mut sub = channel.subscribe(&[EventKind::Comment, EventKind::Comment]);
        channel.publish(event(EventKind::Comment, "n1"));
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn dropped_subscribers_are_pruned_on_publish() {
        let channel = EventChannel::new();
        let keep = channel.subscribe(&[EventKind::Warning]);
        drop(channel.subscribe(&[EventKind::Warning]));
        assert_eq!(channel.subscriber_count(EventKind::Warning), 2);

        assert_eq!(channel.publish(event(EventKind::Warning, "n1")), 1);
        assert_eq!(channel.subscriber_count(EventKind::Warning), 1);
        drop(keep);
    }

    #[test]
    fn unsubscribe_removes_from_every_list() {
        let channel = EventChannel::new();
        let sub = channel.subscribe(&[EventKind::Error, EventKind::Warning]);
        channel.unsubscribe(sub.id());
        assert_eq!(channel.subscriber_count(EventKind::Error), 0);
        assert_eq!(channel.subscriber_count(EventKind::Warning), 0);
    }
}
