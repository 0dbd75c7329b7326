//! Periodic workers: the orchestrator cadence, the retry-queue pass, and the
//! health monitor. Each runs as an independent task; a slow tick never
//! queues a second one behind it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::state::AppState;

const RETRY_QUEUE_INTERVAL: Duration = Duration::from_secs(60);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub fn spawn_workers(state: Arc<AppState>) {
    spawn_scrape_cadence(state.clone());
    spawn_retry_queue(state.clone());
    spawn_health_monitor(state);
}

fn spawn_scrape_cadence(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.scrape_interval_minutes * 60);
    info!(minutes = state.config.scrape_interval_minutes, "Starting scrape cadence");

    tokio::spawn(async move {
        let mut ticker = interval(period);
        // A missed cadence tick must not queue behind a slow one.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let outcome = state.orchestrator.tick().await;
            if outcome.skipped {
                continue;
            }
            // Best-effort dispatch right after ingestion.
            if let Err(e) = state.dispatcher.run_once().await {
                warn!(error = %e, "Post-tick dispatch failed");
            }
        }
    });
}

fn spawn_retry_queue(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = interval(RETRY_QUEUE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = state.retry_queue.process_retries().await {
                warn!(error = %e, "Retry queue pass failed");
            }
        }
    });
}

fn spawn_health_monitor(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = interval(HEALTH_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = state.monitor.check_and_alert(false).await {
                warn!(error = %e, "Health check failed");
            }
        }
    });
}
