//! # Autosave Scheduler
//!
//! Debounce timer for one editable unit. Every `schedule` call cancels the
//! previously armed timer and arms a new one, so a burst of edits collapses into
//! a single job that runs `delay` after the last edit.
//!
//! The timer lives in a spawned task racing a `CancellationToken` against
//! `tokio::time::sleep`. Once the sleep wins, the job runs to completion:
//! cancelling afterwards does not abort an already issued request.
//!
//! [`ToastThrottle`] rate-limits the confirmations shown for automatic saves.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::lock;

/// What started a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveTrigger {
    /// The debounce timer fired.
    Automatic,
    /// The user pressed "Save".
    Manual,
}

/// Currently armed timer: generation number plus its cancellation handle.
type Armed = Option<(u64, CancellationToken)>;

/// Debounce timer with cancel-and-rearm semantics.
pub struct AutosaveScheduler {
    delay: Duration,
    armed: Arc<Mutex<Armed>>,
    generation: Mutex<u64>,
}

impl AutosaveScheduler {
    /// Creates a scheduler with a fixed quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed: Arc::new(Mutex::new(None)),
            generation: Mutex::new(0),
        }
    }

    /// The quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)arms the timer. Any previously armed, not yet fired job is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut g = lock(&self.generation);
            *g += 1;
            *g
        };

        {
            let mut armed = lock(&self.armed);
            if let Some((_, previous)) = armed.replace((generation, token.clone())) {
                previous.cancel();
            }
        }

        let armed = Arc::clone(&self.armed);
        let delay = self.delay;
        log::debug!("Autosave timer armed (generation {}, {:?})", generation, delay);

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::trace!("Autosave timer generation {} cancelled", generation);
                }
                _ = sleep(delay) => {
                    {
                        let mut slot = lock(&armed);
                        if matches!(slot.as_ref(), Some((g, _)) if *g == generation) {
                            *slot = None;
                        }
                    }
                    job().await;
                }
            }
        });
    }

    /// Disarms the pending timer, if any.
    pub fn cancel(&self) {
        let mut armed = lock(&self.armed);
        if let Some((generation, token)) = armed.take() {
            token.cancel();
            log::debug!("Autosave timer generation {} disarmed", generation);
        }
    }

    /// True while a timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        lock(&self.armed).is_some()
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// At most one automatic-save confirmation per window. Manual saves always confirm.
#[derive(Debug)]
pub struct ToastThrottle {
    window: Duration,
    last_automatic: Option<Instant>,
}

impl ToastThrottle {
    /// Creates a throttle with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_automatic: None,
        }
    }

    /// Decides whether a successful save should be confirmed to the user.
    pub fn should_confirm(&mut self, trigger: SaveTrigger, now: Instant) -> bool {
        match trigger {
            SaveTrigger::Manual => true,
            SaveTrigger::Automatic => match self.last_automatic {
                Some(last) if now.duration_since(last) < self.window => false,
                _ => {
                    self.last_automatic = Some(now);
                    true
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_run() {
        let scheduler = AutosaveScheduler::new(Duration::from_millis(1200));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            scheduler.schedule(counting_job(&fired));
            sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending());

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_only_after_quiet_period() {
        let scheduler = AutosaveScheduler::new(Duration::from_millis(1200));
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(counting_job(&fired));

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_run() {
        let scheduler = AutosaveScheduler::new(Duration::from_millis(500));
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(counting_job(&fired));
        scheduler.cancel();
        assert!(!scheduler.is_pending());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_disarms() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let scheduler = AutosaveScheduler::new(Duration::from_millis(500));
            scheduler.schedule(counting_job(&fired));
        }
        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn automatic_confirmations_are_rate_limited() {
        let mut throttle = ToastThrottle::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(throttle.should_confirm(SaveTrigger::Automatic, t0));
        assert!(!throttle.should_confirm(SaveTrigger::Automatic, t0 + Duration::from_secs(3)));
        assert!(throttle.should_confirm(SaveTrigger::Manual, t0 + Duration::from_secs(4)));
        assert!(!throttle.should_confirm(SaveTrigger::Automatic, t0 + Duration::from_secs(9)));
        assert!(throttle.should_confirm(SaveTrigger::Automatic, t0 + Duration::from_secs(10)));
    }
}
