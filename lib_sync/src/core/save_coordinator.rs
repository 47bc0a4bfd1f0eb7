//! # Save Coordinator
//!
//! Owns one editable unit and is the single source of truth for its save
//! lifecycle:
//!
//! ```text
//!   Clean --edit--> Dirty --timer/manual--> Saving --ok--> Clean
//!                     ^                        |
//!                     +-------- error ---------+   (Failed: still dirty, error shown)
//! ```
//!
//! Persistence is serialized by an async gate: automatic and manual saves both
//! acquire it, so at most one `PUT` per unit is ever in flight. A manual save
//! that arrives while an automatic one is running waits for it, then re-checks
//! dirtiness and only issues its own request if something is still unsaved.
//!
//! Views render from [`SaveStatus`], derived from the same state the
//! coordinator mutates, never from a parallel "spinner" flag.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::autosave::{AutosaveScheduler, SaveTrigger, ToastThrottle};
use crate::core::dirty_tracker::DirtyTracker;
use crate::core::fingerprint::Signature;
use crate::core::lock;
use crate::core::model::{FieldMap, SectionSnapshot, SectionStatus, UnitId};
use crate::errors::{Result, SyncError};
use crate::retrieve::api::SectionApi;

/// Which kind of request is in flight, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Nothing in flight.
    Idle,
    /// A debounce-triggered save is in flight.
    Autosaving,
    /// A user-triggered save is in flight.
    ManualSaving,
}

/// Lifecycle phase shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    /// Local content equals the persisted content.
    Clean,
    /// Unsaved local changes.
    Dirty,
    /// A request is in flight.
    Saving,
    /// The last attempt failed; changes are still unsaved.
    Failed,
}

/// Mutable save bookkeeping for one unit.
#[derive(Debug, Clone)]
pub struct SaveState {
    /// Current request kind.
    pub mode: SaveMode,
    /// Completion time of the last successful save.
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Message of the last failed save, cleared when a new attempt starts.
    pub last_error: Option<String>,
}

impl Default for SaveState {
    fn default() -> Self {
        Self {
            mode: SaveMode::Idle,
            last_saved_at: None,
            last_error: None,
        }
    }
}

/// Read-only view the UI renders from.
#[derive(Debug, Clone)]
pub struct SaveStatus {
    /// The phase derived from the flags below; see [`UnitPhase`].
    pub phase: UnitPhase,
    /// Request kind in flight.
    pub mode: SaveMode,
    /// Whether local content differs from the baseline.
    pub dirty: bool,
    /// Completion time of the last successful save.
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Last failure message.
    pub last_error: Option<String>,
}

impl SaveStatus {
    fn derive(state: &SaveState, dirty: bool) -> Self {
        let phase = if state.mode != SaveMode::Idle {
            UnitPhase::Saving
        } else if dirty && state.last_error.is_some() {
            UnitPhase::Failed
        } else if dirty {
            UnitPhase::Dirty
        } else {
            UnitPhase::Clean
        };
        Self {
            phase,
            mode: state.mode,
            dirty,
            last_saved_at: state.last_saved_at,
            last_error: state.last_error.clone(),
        }
    }

    /// One-line indicator text.
    pub fn status_line(&self) -> String {
        match self.phase {
            UnitPhase::Saving => "Saving…".to_string(),
            UnitPhase::Failed => format!("Save failed: {}", self.last_error.as_deref().unwrap_or("unknown error")),
            UnitPhase::Dirty => "Unsaved changes".to_string(),
            UnitPhase::Clean => match self.last_saved_at {
                Some(at) => format!("Last saved at {}", at.with_timezone(&Local).format("%H:%M:%S")),
                None => "All changes saved".to_string(),
            },
        }
    }
}

/// Notifications meant for toasts.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveEvent {
    /// A save succeeded and passed the confirmation throttle.
    Confirmed {
        /// What started the save.
        trigger: SaveTrigger,
        /// Completion time.
        at: DateTime<Utc>,
    },
    /// A save failed. Never throttled.
    Failed {
        /// What started the save.
        trigger: SaveTrigger,
        /// Error text.
        message: String,
    },
}

/// What a save request ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A request was issued and succeeded.
    Saved,
    /// Nothing to save; no request was issued.
    NoChanges,
    /// A request was issued and failed with this message.
    Failed(String),
    /// The unit was disposed; the result, if any, was discarded.
    Disposed,
}

/// Timing knobs of one editable unit. Sessions build these from the
/// configured `debounceMs` and `toastWindowSecs`.
#[derive(Debug, Clone, Copy)]
pub struct AutosaveOptions {
    /// Debounce quiet period.
    pub debounce: Duration,
    /// Minimum spacing between automatic-save confirmations.
    pub toast_window: Duration,
}

impl Default for AutosaveOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1200),
            toast_window: Duration::from_secs(10),
        }
    }
}

struct Inner {
    unit: UnitId,
    api: Arc<dyn SectionApi>,
    tracker: Mutex<DirtyTracker>,
    state: Mutex<SaveState>,
    last_attempted: Mutex<Option<Signature>>,
    gate: tokio::sync::Mutex<()>,
    scheduler: AutosaveScheduler,
    toasts: Mutex<ToastThrottle>,
    live: CancellationToken,
    events: broadcast::Sender<SaveEvent>,
}

/// Handle to one editable unit. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SaveCoordinator {
    inner: Arc<Inner>,
}

impl SaveCoordinator {
    /// Starts tracking a unit loaded with `loaded` as its persisted content.
    pub fn new(
        unit: UnitId,
        loaded: SectionSnapshot,
        api: Arc<dyn SectionApi>,
        options: AutosaveOptions,
    ) -> Result<Self> {
        let tracker = DirtyTracker::new(unit.clone(), loaded)?;
        let (events, _) = broadcast::channel(32);
        Ok(Self {
            inner: Arc::new(Inner {
                unit,
                api,
                tracker: Mutex::new(tracker),
                state: Mutex::new(SaveState::default()),
                last_attempted: Mutex::new(None),
                gate: tokio::sync::Mutex::new(()),
                scheduler: AutosaveScheduler::new(options.debounce),
                toasts: Mutex::new(ToastThrottle::new(options.toast_window)),
                live: CancellationToken::new(),
                events,
            }),
        })
    }

    /// Identity of the unit.
    pub fn unit(&self) -> &UnitId {
        &self.inner.unit
    }

    /// Sets one field and (re)arms the autosave timer if the unit is dirty.
    pub fn edit_field(&self, field: &str, text: &str) -> Result<()> {
        self.ensure_live()?;
        let dirty = lock(&self.inner.tracker).edit_field(field, text)?;
        self.after_edit(dirty);
        Ok(())
    }

    /// Changes the review status through the same save path as content.
    pub fn set_status(&self, status: SectionStatus) -> Result<()> {
        self.ensure_live()?;
        let dirty = lock(&self.inner.tracker).set_status(status)?;
        self.after_edit(dirty);
        Ok(())
    }

    /// Replaces all fields at once.
    pub fn replace_content(&self, content: FieldMap) -> Result<()> {
        self.ensure_live()?;
        let dirty = lock(&self.inner.tracker).replace_content(content)?;
        self.after_edit(dirty);
        Ok(())
    }

    /// Discards local edits and disarms the timer.
    pub fn restore(&self) -> Result<()> {
        self.ensure_live()?;
        lock(&self.inner.tracker).restore();
        self.inner.scheduler.cancel();
        Ok(())
    }

    /// Current local content.
    pub fn snapshot(&self) -> SectionSnapshot {
        lock(&self.inner.tracker).snapshot().clone()
    }

    /// Whether local content differs from the persisted content.
    pub fn is_dirty(&self) -> bool {
        lock(&self.inner.tracker).is_dirty()
    }

    /// The view model for indicators.
    pub fn status(&self) -> SaveStatus {
        let dirty = self.is_dirty();
        SaveStatus::derive(&lock(&self.inner.state), dirty)
    }

    /// True while an autosave timer is armed.
    pub fn autosave_pending(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    /// Subscribes to toast notifications.
    pub fn events(&self) -> broadcast::Receiver<SaveEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the owning view is still mounted.
    pub fn is_live(&self) -> bool {
        !self.inner.live.is_cancelled()
    }

    /// User-triggered save. Bypasses the timer but queues behind any request
    /// already in flight, then saves only if the unit is still dirty.
    pub async fn save_now(&self) -> SaveOutcome {
        if !self.is_live() {
            return SaveOutcome::Disposed;
        }
        self.inner.scheduler.cancel();
        let _permit = self.inner.gate.lock().await;
        if !self.is_live() {
            return SaveOutcome::Disposed;
        }
        if !self.is_dirty() {
            log::debug!("Manual save of {} skipped: nothing to save", self.inner.unit);
            return SaveOutcome::NoChanges;
        }
        self.persist(SaveTrigger::Manual).await
    }

    /// Tears the unit down: disarms the timer and turns any late response into a no-op.
    pub fn dispose(&self) {
        self.inner.live.cancel();
        self.inner.scheduler.cancel();
        log::debug!("Editable unit {} disposed", self.inner.unit);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(SyncError::Disposed)
        }
    }

    fn after_edit(&self, dirty: bool) {
        if dirty {
            self.arm_autosave();
        } else {
            self.inner.scheduler.cancel();
        }
    }

    fn arm_autosave(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                SaveCoordinator { inner }.run_autosave().await;
            }
        });
    }

    async fn run_autosave(&self) -> SaveOutcome {
        if !self.is_live() {
            return SaveOutcome::Disposed;
        }
        let _permit = self.inner.gate.lock().await;
        if !self.is_live() {
            return SaveOutcome::Disposed;
        }

        let (dirty, current) = {
            let tracker = lock(&self.inner.tracker);
            (tracker.is_dirty(), tracker.current_signature().clone())
        };
        let repeat = lock(&self.inner.last_attempted).as_ref() == Some(&current);
        if !dirty || repeat {
            log::debug!(
                "Autosave of {} skipped (dirty: {}, already attempted: {})",
                self.inner.unit,
                dirty,
                repeat
            );
            return SaveOutcome::NoChanges;
        }
        self.persist(SaveTrigger::Automatic).await
    }

    /// Issues the request. The caller holds the gate.
    async fn persist(&self, trigger: SaveTrigger) -> SaveOutcome {
        let (snapshot, attempted) = {
            let tracker = lock(&self.inner.tracker);
            (tracker.snapshot().clone(), tracker.current_signature().clone())
        };
        *lock(&self.inner.last_attempted) = Some(attempted.clone());
        {
            let mut state = lock(&self.inner.state);
            state.mode = match trigger {
                SaveTrigger::Automatic => SaveMode::Autosaving,
                SaveTrigger::Manual => SaveMode::ManualSaving,
            };
            state.last_error = None;
        }
        log::info!("Saving {} ({:?}, signature {})", self.inner.unit, trigger, attempted.short());

        let response = self.inner.api.put_section(&self.inner.unit.id, &snapshot).await;

        if !self.is_live() {
            log::debug!("Response for disposed unit {} ignored", self.inner.unit);
            return SaveOutcome::Disposed;
        }

        let accepted = response
            .map_err(SyncError::from)
            .and_then(|saved| lock(&self.inner.tracker).accept_saved(&attempted, saved.snapshot()));

        match accepted {
            Ok(still_dirty) => {
                let at = Utc::now();
                {
                    let mut state = lock(&self.inner.state);
                    state.mode = SaveMode::Idle;
                    state.last_saved_at = Some(at);
                    state.last_error = None;
                }
                log::info!("Saved {} (still dirty: {})", self.inner.unit, still_dirty);
                if lock(&self.inner.toasts).should_confirm(trigger, Instant::now()) {
                    let _ = self.inner.events.send(SaveEvent::Confirmed { trigger, at });
                }
                if still_dirty {
                    self.arm_autosave();
                }
                SaveOutcome::Saved
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut state = lock(&self.inner.state);
                    state.mode = SaveMode::Idle;
                    state.last_error = Some(message.clone());
                }
                log::warn!("Saving {} failed: {}", self.inner.unit, message);
                let _ = self.inner.events.send(SaveEvent::Failed {
                    trigger,
                    message: message.clone(),
                });
                SaveOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::SavedSection;
    use crate::errors::ApiError;
    use crate::retrieve::api::ApiResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<SectionSnapshot>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail: AtomicBool,
        latency_ms: u64,
    }

    impl RecordingApi {
        fn with_latency(ms: u64) -> Self {
            Self {
                latency_ms: ms,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<SectionSnapshot> {
            lock(&self.calls).clone()
        }
    }

    #[async_trait]
    impl SectionApi for RecordingApi {
        async fn put_section(&self, id: &str, snapshot: &SectionSnapshot) -> ApiResult<SavedSection> {
            lock(&self.calls).push(snapshot.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.latency_ms > 0 {
                sleep(Duration::from_millis(self.latency_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::Transport("connection reset".into()));
            }
            Ok(SavedSection {
                id: id.to_string(),
                owner_id: Some("doc1".into()),
                content: snapshot.content.clone(),
                status: snapshot.status,
            })
        }
    }

    fn coordinator(api: Arc<RecordingApi>) -> SaveCoordinator {
        let loaded = SectionSnapshot::from_fields([("summary", "")], SectionStatus::Draft);
        SaveCoordinator::new(UnitId::new("s1", "doc1"), loaded, api, AutosaveOptions::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn keystroke_burst_saves_once_with_final_text() {
        let api = Arc::new(RecordingApi::default());
        let unit = coordinator(api.clone());

        unit.edit_field("summary", "a").unwrap();
        sleep(Duration::from_millis(300)).await;
        unit.edit_field("summary", "ab").unwrap();
        sleep(Duration::from_millis(300)).await;
        unit.edit_field("summary", "abc").unwrap();
        assert_eq!(unit.status().phase, UnitPhase::Dirty);

        sleep(Duration::from_millis(1100)).await;
        assert!(api.calls().is_empty());

        sleep(Duration::from_millis(200)).await;
        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].content["summary"], "abc");

        let status = unit.status();
        assert_eq!(status.phase, UnitPhase::Clean);
        assert!(status.last_error.is_none());
        assert!(status.last_saved_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reverting_to_baseline_issues_no_save() {
        let api = Arc::new(RecordingApi::default());
        let unit = coordinator(api.clone());

        unit.edit_field("summary", "typo").unwrap();
        sleep(Duration::from_millis(400)).await;
        unit.edit_field("summary", "").unwrap();
        assert!(!unit.autosave_pending());

        sleep(Duration::from_secs(5)).await;
        assert!(api.calls().is_empty());
        assert_eq!(unit.status().phase, UnitPhase::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_save_during_autosave_is_serialized() {
        let api = Arc::new(RecordingApi::with_latency(500));
        let unit = coordinator(api.clone());

        unit.edit_field("summary", "first").unwrap();
        sleep(Duration::from_millis(1300)).await;
        assert_eq!(api.calls().len(), 1);
        assert_eq!(unit.status().phase, UnitPhase::Saving);
        assert_eq!(unit.status().mode, SaveMode::Autosaving);

        unit.edit_field("summary", "second").unwrap();
        let outcome = unit.save_now().await;

        assert_eq!(outcome, SaveOutcome::Saved);
        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].content["summary"], "second");
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(unit.status().phase, UnitPhase::Clean);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn double_manual_click_sends_once() {
        let api = Arc::new(RecordingApi::with_latency(200));
        let unit = coordinator(api.clone());
        unit.edit_field("summary", "text").unwrap();

        let (a, b) = tokio::join!(unit.save_now(), unit.save_now());
        assert_eq!(a, SaveOutcome::Saved);
        assert_eq!(b, SaveOutcome::NoChanges);
        assert_eq!(api.calls().len(), 1);
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_flight_reenters_dirty_and_saves_again() {
        let api = Arc::new(RecordingApi::with_latency(500));
        let unit = coordinator(api.clone());

        unit.edit_field("summary", "v1").unwrap();
        sleep(Duration::from_millis(1300)).await;
        unit.edit_field("summary", "v2").unwrap();

        sleep(Duration::from_millis(450)).await;
        assert_eq!(api.calls().len(), 1);
        assert!(unit.is_dirty());
        assert_ne!(unit.status().phase, UnitPhase::Clean);

        sleep(Duration::from_secs(3)).await;
        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].content["summary"], "v2");
        assert_eq!(unit.status().phase, UnitPhase::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reverts_to_dirty_without_retry() {
        let api = Arc::new(RecordingApi::default());
        api.fail.store(true, Ordering::SeqCst);
        let unit = coordinator(api.clone());
        let mut events = unit.events();

        unit.edit_field("summary", "text").unwrap();
        sleep(Duration::from_secs(2)).await;

        let status = unit.status();
        assert_eq!(status.phase, UnitPhase::Failed);
        assert!(status.status_line().starts_with("Save failed"));
        assert!(matches!(events.try_recv(), Ok(SaveEvent::Failed { trigger: SaveTrigger::Automatic, .. })));

        sleep(Duration::from_secs(30)).await;
        assert_eq!(api.calls().len(), 1);

        api.fail.store(false, Ordering::SeqCst);
        assert_eq!(unit.save_now().await, SaveOutcome::Saved);
        assert_eq!(unit.status().phase, UnitPhase::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn reverting_to_failed_content_does_not_refire() {
        let api = Arc::new(RecordingApi::default());
        api.fail.store(true, Ordering::SeqCst);
        let unit = coordinator(api.clone());

        unit.edit_field("summary", "x").unwrap();
        sleep(Duration::from_secs(2)).await;
        unit.edit_field("summary", "y").unwrap();
        unit.edit_field("summary", "x").unwrap();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_pending_timer() {
        let api = Arc::new(RecordingApi::default());
        let unit = coordinator(api.clone());
        unit.edit_field("summary", "unsaved").unwrap();
        unit.dispose();

        sleep(Duration::from_secs(5)).await;
        assert!(api.calls().is_empty());
        assert!(matches!(unit.edit_field("summary", "more"), Err(SyncError::Disposed)));
        assert_eq!(unit.save_now().await, SaveOutcome::Disposed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_after_dispose_is_ignored() {
        let api = Arc::new(RecordingApi::with_latency(1000));
        let unit = coordinator(api.clone());
        unit.edit_field("summary", "text").unwrap();

        let saver = unit.clone();
        let handle = tokio::spawn(async move { saver.save_now().await });
        sleep(Duration::from_millis(100)).await;
        unit.dispose();

        assert_eq!(handle.await.unwrap(), SaveOutcome::Disposed);
        assert_eq!(api.calls().len(), 1);
        let status = unit.status();
        assert!(status.last_saved_at.is_none());
        assert!(status.dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn automatic_confirmations_are_throttled_manual_always_confirm() {
        let api = Arc::new(RecordingApi::default());
        let unit = coordinator(api.clone());
        let mut events = unit.events();

        unit.edit_field("summary", "one").unwrap();
        sleep(Duration::from_secs(2)).await;
        unit.edit_field("summary", "two").unwrap();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(api.calls().len(), 2);

        assert!(matches!(events.try_recv(), Ok(SaveEvent::Confirmed { trigger: SaveTrigger::Automatic, .. })));
        assert!(events.try_recv().is_err());

        unit.edit_field("summary", "three").unwrap();
        assert_eq!(unit.save_now().await, SaveOutcome::Saved);
        assert!(matches!(events.try_recv(), Ok(SaveEvent::Confirmed { trigger: SaveTrigger::Manual, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn status_change_is_persisted() {
        let api = Arc::new(RecordingApi::default());
        let unit = coordinator(api.clone());
        unit.set_status(SectionStatus::ReadyForReview).unwrap();
        assert_eq!(unit.save_now().await, SaveOutcome::Saved);
        assert_eq!(api.calls()[0].status, SectionStatus::ReadyForReview);
    }

    #[test]
    fn status_lines() {
        let mut state = SaveState::default();
        assert_eq!(SaveStatus::derive(&state, false).status_line(), "All changes saved");
        assert_eq!(SaveStatus::derive(&state, true).status_line(), "Unsaved changes");
        state.mode = SaveMode::ManualSaving;
        assert_eq!(SaveStatus::derive(&state, true).status_line(), "Saving…");
        state.mode = SaveMode::Idle;
        state.last_saved_at = Some(Utc::now());
        assert!(SaveStatus::derive(&state, false).status_line().starts_with("Last saved at "));
    }
}
