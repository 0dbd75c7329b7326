use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserbase_client::{BrowserConfig, BrowserbaseClient, Geolocation};
use budwatch_common::{CircuitRegistry, Config};
use budwatch_scraper::{load_locations, Orchestrator, OrchestratorConfig};

/// One-shot scrape run: load the location set, run a single tick, deliver the
/// batch to the configured ingest endpoint, and exit.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("budwatch=info".parse()?))
        .init();

    info!("budwatch scraper starting...");

    let config = Config::scraper_from_env();
    config.log_redacted();

    let locations = load_locations(&config.menu_locations_path)?;

    let browser = BrowserbaseClient::new(&config.browserbase_api_key, &config.browserbase_project_id);
    let geolocation = config.browserbase_geo_city.is_some().then(|| Geolocation {
        city: config.browserbase_geo_city.clone(),
        state: config.browserbase_geo_state.clone(),
        country: config.browserbase_geo_country.clone(),
    });

    let orchestrator = Orchestrator::new(OrchestratorConfig {
        locations,
        browser,
        browser_config: BrowserConfig {
            proxies: config.browserbase_proxies,
            geolocation,
        },
        circuits: Arc::new(CircuitRegistry::new()),
        ingest_url: config.ingest_url.clone(),
        ingest_api_key: config.ingest_api_key.clone(),
        operator_webhook: (!config.discord_webhook_url.is_empty())
            .then(|| config.discord_webhook_url.clone()),
    });

    let outcome = orchestrator.tick().await;
    info!(
        batch_id = %outcome.batch_id,
        succeeded = outcome.locations_succeeded,
        failed = outcome.locations_failed,
        items = outcome.total_items,
        "Scrape run complete"
    );

    Ok(())
}
