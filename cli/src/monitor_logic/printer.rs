use std::sync::Arc;

use lib_sync::realtime::{ConnectionState, EventKind, LocalEvent, RealtimeBus, RefreshOutcome, Subject, SubjectWatcher};
use tokio_util::sync::CancellationToken;

/// One printable line per event.
pub fn format_event(event: &LocalEvent, unread: usize) -> String {
    let link = event.link.as_ref().map(|l| l.as_str()).unwrap_or("-");
    format!(
        "{} [{}] {} {} ({}) unread={}",
        event.created_at.format("%Y-%m-%d %H:%M:%S"),
        event.kind,
        event.notification_id,
        event.message,
        link,
        unread
    )
}

/// Prints every event, or only those about `subject` when one is given.
pub async fn run_event_printer(bus: Arc<RealtimeBus>, subject: Option<Subject>, shutdown: CancellationToken) {
    match subject {
        Some(subject) => {
            let mut watcher = SubjectWatcher::new(&bus, &EventKind::ALL, subject);
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    ev = watcher.next_relevant() => match ev {
                        Some(ev) => ev,
                        None => break,
                    },
                };
                println!("{}", format_event(&event, bus.notifications().unread_count()));
            }
        }
        None => {
            let mut subscription = bus.subscribe_all();
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    ev = subscription.recv() => match ev {
                        Some(ev) => ev,
                        None => break,
                    },
                };
                println!("{}", format_event(&event, bus.notifications().unread_count()));
            }
        }
    }
}

/// Re-fetches the authoritative notification list whenever the push stream
/// (re)connects, since events sent while disconnected are not replayed.
pub async fn run_refresh_on_connect(bus: Arc<RealtimeBus>, shutdown: CancellationToken) {
    let mut state = bus.connection_state();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *state.borrow_and_update() != ConnectionState::Connected {
            continue;
        }
        match bus.notifications().refresh().await {
            Ok(RefreshOutcome::Applied(n)) => {
                log::info!("Notification list reloaded after connect: {} entries", n);
                println!("-- {} notifications, {} unread", n, bus.notifications().unread_count());
            }
            Ok(RefreshOutcome::Merged { fetched, replayed }) => {
                log::info!(
                    "Notification list reloaded after connect: {} entries, {} pushes and edits kept",
                    fetched,
                    replayed
                );
                println!("-- {} notifications, {} unread", bus.notifications().len(), bus.notifications().unread_count());
            }
            Err(e) => log::warn!("Failed to reload notifications after connect: {}", e),
        }
    }
}
