//! # Realtime Invalidation Bus
//!
//! One shared push connection per session, fanned out in-process:
//!
//! - **`events`**: event kinds, the dispatch table, links and subjects.
//! - **`channel`**: the kind-keyed observer list.
//! - **`notifications`**: the user-facing notification list.
//! - **`bus`**: stores, classifies and re-emits pushed notifications.
//! - **`watcher`**: subscriber-side subject filtering and cache invalidation.
//! - **`ws_transport`**: the WebSocket client (feature `ws`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Event vocabulary.
pub mod events;
/// Local pub/sub.
pub mod channel;
/// Notification list.
pub mod notifications;
/// The bus proper.
pub mod bus;
/// Subject filtering.
pub mod watcher;
/// WebSocket push client.
#[cfg(feature = "ws")]
pub mod ws_transport;

// --- Public API Re-exports ---
pub use events::{EventKind, Link, LocalEvent, Subject};
pub use channel::{EventChannel, Subscription};
pub use notifications::{ClearReport, NotificationEvent, NotificationStore, RefreshOutcome};
pub use bus::{ConnectionState, RealtimeBus, TransportHandle};
pub use watcher::{spawn_cache_invalidator, SubjectWatcher};
#[cfg(feature = "ws")]
pub use ws_transport::{WsPushTransport, WsTransportConfig};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;

    use crate::retrieve::api::{ApiResult, NotificationApi, NotificationRecord};

    /// Server that accepts everything and lists nothing.
    pub(crate) struct QuietNotifications;

    #[async_trait]
    impl NotificationApi for QuietNotifications {
        async fn list(&self) -> ApiResult<Vec<NotificationRecord>> {
            Ok(vec![])
        }
        async fn mark_read(&self, _id: &str) -> ApiResult<()> {
            Ok(())
        }
        async fn mark_all_read(&self) -> ApiResult<()> {
            Ok(())
        }
        async fn delete(&self, _id: &str) -> ApiResult<()> {
            Ok(())
        }
        async fn clear_all(&self) -> ApiResult<()> {
            Ok(())
        }
    }
}
