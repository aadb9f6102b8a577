//! Auto-sync scheduler.
//!
//! A fixed-period timer, much finer-grained than the user-configured sync
//! interval. Each tick checks whether that interval has elapsed since the
//! last successful sync and, if so and the guard is idle, triggers an
//! inbound merge-download. Outbound sync is not scheduled here; it is
//! event-driven from store changes.
//!
//! Settings changes arrive over a watch channel and are debounced so rapid
//! consecutive writes from the settings form coalesce into one application.
//! Disabling auto-sync makes ticks inert without restarting the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::SyncEngine;
use crate::history::SyncKind;
use crate::settings::SyncSettings;

pub(crate) fn start(
    engine: Arc<SyncEngine>,
    mut settings_rx: watch::Receiver<SyncSettings>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let tick = Duration::from_secs(engine.config().scheduler_tick_secs);
    let debounce = engine.config().settings_debounce();

    tokio::spawn(async move {
        let mut settings = settings_rx.borrow().clone();
        info!(tick_secs = tick.as_secs(), "Auto-sync scheduler started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Coalesce rapid consecutive writes: wait for a quiet
                    // window before applying the latest value.
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep(debounce) => break,
                            more = settings_rx.changed() => {
                                if more.is_err() {
                                    break;
                                }
                            }
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    return;
                                }
                            }
                        }
                    }
                    settings = settings_rx.borrow_and_update().clone();
                    info!(
                        auto_sync = settings.auto_sync_enabled,
                        interval_minutes = settings.auto_sync_interval_minutes,
                        "Sync settings applied to scheduler"
                    );
                }
                _ = tokio::time::sleep(tick) => {
                    if !settings.auto_sync_enabled {
                        continue;
                    }
                    if !settings.is_remote_configured() {
                        continue;
                    }
                    if !engine.guard().is_idle() {
                        debug!("Tick skipped, another operation holds the guard");
                        continue;
                    }
                    if !engine.auto_sync_due(&settings) {
                        continue;
                    }
                    debug!("Auto-sync interval elapsed, merging remote changes");
                    if let Err(e) = engine.run_download(true, SyncKind::Auto).await {
                        debug!(error = %e, "Scheduled merge-download did not complete");
                    }
                }
            }
        }

        info!("Auto-sync scheduler stopped");
    })
}
