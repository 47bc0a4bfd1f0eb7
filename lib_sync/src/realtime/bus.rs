//! # Realtime Bus
//!
//! The session's single push connection point. A transport (the WebSocket
//! client in production, a test harness otherwise) attaches once and feeds raw
//! frames in; the bus stores each pushed notification, classifies it and
//! re-emits it on the local [`EventChannel`] for any mounted consumer.
//!
//! Only one transport can be attached at a time: [`RealtimeBus::attach`]
//! hands out a [`TransportHandle`] and refuses a second one until the first
//! is dropped. Connection churn never touches the notification store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, SyncError};
use crate::realtime::channel::{EventChannel, Subscription};
use crate::realtime::events::{EventKind, Link, LocalEvent};
use crate::realtime::notifications::{NotificationEvent, NotificationStore};
use crate::retrieve::api::NotificationRecord;

/// Transport connection state as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport, or the transport is waiting to retry.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Frames are flowing.
    Connected,
}

/// Session-scoped fan-out hub for pushed notifications.
pub struct RealtimeBus {
    store: Arc<NotificationStore>,
    channel: EventChannel,
    attached: AtomicBool,
    connection: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl RealtimeBus {
    /// Creates the bus around the session's notification store.
    pub fn new(store: Arc<NotificationStore>) -> Arc<Self> {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            store,
            channel: EventChannel::new(),
            attached: AtomicBool::new(false),
            connection,
            shutdown: CancellationToken::new(),
        })
    }

    /// The store pushed notifications are prepended to.
    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Subscribes to the given kinds.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        self.channel.subscribe(kinds)
    }

    /// Subscribes to everything.
    pub fn subscribe_all(&self) -> Subscription {
        self.channel.subscribe_all()
    }

    /// Handles one pushed notification: store it, classify it, re-emit it.
    ///
    /// Returns `None` when the store already held this id, in which case
    /// nothing is re-emitted.
    pub fn deliver(&self, record: NotificationRecord) -> Option<Arc<LocalEvent>> {
        let event = Arc::new(LocalEvent {
            kind: EventKind::classify(&record.kind),
            wire_type: record.kind.clone(),
            notification_id: record.id.clone(),
            message: record.message.clone(),
            link: record.link.as_deref().map(Link::parse),
            created_at: record.created_at,
        });

        if !self.store.prepend(NotificationEvent::from_record(record)) {
            log::debug!("Duplicate push {} ignored", event.notification_id);
            return None;
        }
        if event.kind == EventKind::Other {
            log::debug!("Push {} has unrecognized type '{}'", event.notification_id, event.wire_type);
        }
        let delivered = self.channel.publish(Arc::clone(&event));
        log::debug!("Push {} ({}) delivered to {} subscribers", event.notification_id, event.kind, delivered);
        Some(event)
    }

    /// Decodes a raw JSON frame and [`deliver`](Self::deliver)s it.
    pub fn ingest_frame(&self, raw: &str) -> Result<Option<Arc<LocalEvent>>> {
        let record: NotificationRecord = serde_json::from_str(raw)?;
        Ok(self.deliver(record))
    }

    /// Claims the bus for a transport. Fails with [`SyncError::AlreadyConnected`]
    /// while another handle is alive, and with [`SyncError::Disposed`] after shutdown.
    pub fn attach(self: &Arc<Self>) -> Result<TransportHandle> {
        if self.shutdown.is_cancelled() {
            return Err(SyncError::Disposed);
        }
        if self.attached.swap(true, Ordering::AcqRel) {
            return Err(SyncError::AlreadyConnected);
        }
        log::info!("Push transport attached to realtime bus");
        Ok(TransportHandle {
            bus: Arc::clone(self),
        })
    }

    /// True while a transport holds the bus.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Watches connection state. Consumers typically re-fetch the
    /// authoritative list on every transition to `Connected`.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Tells the transport and every background consumer to stop.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            log::info!("Realtime bus shutting down");
            self.shutdown.cancel();
        }
    }
}

/// Exclusive right to feed the bus. Dropping it frees the slot.
pub struct TransportHandle {
    bus: Arc<RealtimeBus>,
}

impl TransportHandle {
    /// Forwards one raw frame.
    pub fn ingest_frame(&self, raw: &str) -> Result<Option<Arc<LocalEvent>>> {
        self.bus.ingest_frame(raw)
    }

    /// Publishes a connection state transition.
    pub fn set_state(&self, state: ConnectionState) {
        self.bus.connection.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// Cancelled when the bus shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.bus.shutdown.clone()
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.set_state(ConnectionState::Disconnected);
        self.bus.attached.store(false, Ordering::Release);
        log::info!("Push transport detached from realtime bus");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::Subject;
    use crate::realtime::testing::QuietNotifications;

    fn bus() -> Arc<RealtimeBus> {
        RealtimeBus::new(Arc::new(NotificationStore::new(Arc::new(QuietNotifications))))
    }

    fn frame(id: &str, kind: &str, link: &str) -> String {
        format!(
            r#"{{"id":"{}","type":"{}","message":"m","link":"{}","created_at":"2026-03-01T10:00:00Z"}}"#,
            id, kind, link
        )
    }

    #[test]
    fn second_transport_is_refused_until_the_first_detaches() {
        let bus = bus();
        let first = bus.attach().unwrap();
        assert!(matches!(bus.attach(), Err(SyncError::AlreadyConnected)));
        drop(first);
        assert!(bus.attach().is_ok());
    }

    #[test]
    fn attach_after_shutdown_is_refused() {
        let bus = bus();
        bus.shutdown();
        assert!(matches!(bus.attach(), Err(SyncError::Disposed)));
    }

    #[test]
    fn frames_are_stored_classified_and_fanned_out() {
        let bus = bus();
        let mut sub = bus.subscribe(&[EventKind::StatusChange]);
        let handle = bus.attach().unwrap();

        let ev = handle
            .ingest_frame(&frame("n1", "status_change", "/programs/4"))
            .unwrap()
            .unwrap();
        assert_eq!(ev.kind, EventKind::StatusChange);
        assert!(ev.pertains_to(&Subject::new("programs", "4")));
        assert_eq!(sub.try_recv().unwrap().notification_id, "n1");
        assert_eq!(bus.notifications().len(), 1);
        assert_eq!(bus.notifications().unread_count(), 1);
    }

    #[test]
    fn duplicate_and_malformed_frames() {
        let bus = bus();
        let mut sub = bus.subscribe_all();
        assert!(bus.ingest_frame(&frame("n1", "comment", "/a/1")).unwrap().is_some());
        assert!(bus.ingest_frame(&frame("n1", "comment", "/a/1")).unwrap().is_none());
        assert!(matches!(bus.ingest_frame("not json"), Err(SyncError::Decode(_))));
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
        assert_eq!(bus.notifications().len(), 1);
    }

    #[test]
    fn unknown_types_reach_catch_all_subscribers_only() {
        let bus = bus();
        let mut all = bus.subscribe_all();
        let mut comments = bus.subscribe(&[EventKind::Comment]);
        bus.ingest_frame(&frame("n1", "audit-scheduled", "/programs/1")).unwrap();
        assert_eq!(all.try_recv().unwrap().kind, EventKind::Other);
        assert!(comments.try_recv().is_none());
    }

    #[test]
    fn connection_state_follows_the_handle() {
        let bus = bus();
        let state = bus.connection_state();
        let handle = bus.attach().unwrap();
        handle.set_state(ConnectionState::Connected);
        assert_eq!(*state.borrow(), ConnectionState::Connected);
        drop(handle);
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
        assert!(!bus.is_attached());
    }
}
