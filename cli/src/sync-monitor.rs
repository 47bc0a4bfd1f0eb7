//! # sync-monitor
//!
//! Opens a sync session against the configured backend, keeps the single push
//! connection alive and prints notifications as they arrive. Status changes
//! evict the matching cached analyses. Stops on Ctrl-C or SIGTERM.

use anyhow::Result;
use lib_sync::loggers::setup_logging;
use lib_sync::realtime::{Subject, WsTransportConfig};
use lib_sync::SyncSession;
use tokio::signal;

mod monitor_logic;
use monitor_logic::{config, printer};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (cli, sync_config) = config::load_config();
    let log_path = setup_logging(&sync_config.log_dir(), "sync_monitor", sync_config.log_level())?;
    log::info!("Logging to {}", log_path.display());

    let session = SyncSession::from_config(&sync_config)?;

    match session.notifications().refresh().await {
        Ok(outcome) => log::info!("Initial notification load: {:?}", outcome),
        Err(e) => log::warn!("Initial notification load failed: {}", e),
    }
    println!(
        "-- {} notifications, {} unread",
        session.notifications().len(),
        session.notifications().unread_count()
    );

    let collection = cli.collection.clone().unwrap_or_else(|| "programs".to_string());
    session.watch_cache_invalidation(&collection);

    let subject = cli.watch_subject().map(|(c, id)| Subject::new(c, id));
    let shutdown = session.bus().shutdown_token();
    session.track(tokio::spawn(printer::run_event_printer(
        session.bus().clone(),
        subject,
        shutdown.clone(),
    )));
    session.track(tokio::spawn(printer::run_refresh_on_connect(
        session.bus().clone(),
        shutdown,
    )));

    match &sync_config.push_url {
        Some(url) => {
            let ws_config = WsTransportConfig {
                url: url.clone(),
                auth_token: sync_config.auth_token.clone(),
                reconnect_delay: sync_config.reconnect_delay(),
            };
            session.connect_push(ws_config)?;
        }
        None => log::warn!("No pushUrl configured; only the initial notification list is shown."),
    }

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {}
    }

    session.shutdown().await;
    log::info!("Shutdown complete.");
    Ok(())
}
