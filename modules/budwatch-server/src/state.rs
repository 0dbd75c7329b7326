use std::sync::Arc;

use budwatch_common::{Config, MenuLocation};
use budwatch_ingest::{CatalogStore, IngestionEngine};
use budwatch_monitor::HealthMonitor;
use budwatch_notify::{NotificationDispatcher, RetryQueue};
use budwatch_scraper::Orchestrator;

pub struct AppState {
    pub config: Config,
    pub store: CatalogStore,
    pub engine: IngestionEngine,
    pub orchestrator: Arc<Orchestrator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub retry_queue: Arc<RetryQueue>,
    pub monitor: Arc<HealthMonitor>,
    pub locations: Vec<MenuLocation>,
}
