use std::sync::Arc;

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserbase_client::{BrowserConfig, BrowserbaseClient, Geolocation};
use budwatch_common::{CircuitRegistry, Config};
use budwatch_ingest::{CatalogStore, IngestionEngine};
use budwatch_monitor::{HealthMonitor, HealthMonitorConfig};
use budwatch_notify::{
    DiscordWebhook, DispatcherConfig, NotificationDispatcher, RetryQueue, RetryQueueConfig,
};
use budwatch_scraper::{load_locations, Orchestrator, OrchestratorConfig};

mod rest;
mod seed;
mod state;
mod workers;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("budwatch=info".parse()?))
        .init();

    info!("budwatch server starting...");

    let config = Config::server_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let store = CatalogStore::new(pool);
    store.migrate().await?;

    let locations = load_locations(&config.menu_locations_path)?;
    seed::seed_retailers(&store, &locations).await?;

    let circuits = Arc::new(CircuitRegistry::new());
    let browser = BrowserbaseClient::new(&config.browserbase_api_key, &config.browserbase_project_id);
    let geolocation = config.browserbase_geo_city.is_some().then(|| Geolocation {
        city: config.browserbase_geo_city.clone(),
        state: config.browserbase_geo_state.clone(),
        country: config.browserbase_geo_country.clone(),
    });

    let orchestrator = Arc::new(Orchestrator::new(OrchestratorConfig {
        locations: locations.clone(),
        browser,
        browser_config: BrowserConfig {
            proxies: config.browserbase_proxies,
            geolocation,
        },
        circuits,
        ingest_url: config.ingest_url.clone(),
        ingest_api_key: config.ingest_api_key.clone(),
        operator_webhook: Some(config.discord_webhook_url.clone()),
    }));

    let sink = Arc::new(DiscordWebhook::new());
    let retry_queue = Arc::new(RetryQueue::new(
        store.clone(),
        sink.clone(),
        RetryQueueConfig::default(),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        sink.clone(),
        retry_queue.clone(),
        DispatcherConfig {
            default_webhook_url: config.discord_webhook_url.clone(),
            ..DispatcherConfig::default()
        },
    ));
    let alerts_webhook = config
        .discord_webhook_url_alerts
        .clone()
        .unwrap_or_else(|| config.discord_webhook_url.clone());
    let monitor = Arc::new(HealthMonitor::new(
        store.clone(),
        sink,
        alerts_webhook,
        HealthMonitorConfig::default(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        engine: IngestionEngine::new(store.clone()),
        store,
        orchestrator,
        dispatcher,
        retry_queue,
        monitor,
        locations,
    });

    workers::spawn_workers(state.clone());

    let cors = {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
        if config.allowed_origins.is_empty() {
            layer.allow_origin(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            layer.allow_origin(origins)
        }
    };

    let app = Router::new()
        .route("/ingest/scraped-batch", post(rest::ingest::ingest_batch_handler))
        .route("/health", get(rest::ops::health_handler))
        .route("/trigger", post(rest::ops::trigger_handler))
        .route("/locations", get(rest::ops::locations_handler))
        .route("/alerts/check", post(rest::ops::alerts_check_handler))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(addr = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
