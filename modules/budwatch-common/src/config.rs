use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Remote browser vendor
    pub browserbase_api_key: String,
    pub browserbase_project_id: String,
    pub browserbase_proxies: bool,
    pub browserbase_geo_city: Option<String>,
    pub browserbase_geo_state: Option<String>,
    pub browserbase_geo_country: Option<String>,

    // Ingestion endpoint
    pub ingest_url: String,
    pub ingest_api_key: Option<String>,

    // Webhooks
    pub discord_webhook_url: String,
    pub discord_webhook_url_alerts: Option<String>,

    // Web server
    pub web_host: String,
    pub web_port: u16,
    /// Origins allowed by CORS (orchestrator + admin dashboard). Empty means
    /// any origin.
    pub allowed_origins: Vec<String>,

    // Scheduling
    pub scrape_interval_minutes: u64,

    // Curated location set
    pub menu_locations_path: String,
}

impl Config {
    /// Load config for the server binary (everything: API, orchestrator,
    /// dispatcher, retry queue, health monitor).
    /// Panics with a clear message if required vars are missing.
    pub fn server_from_env() -> Self {
        let web_port: u16 = env::var("WEB_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .expect("WEB_PORT must be a number");

        Self {
            database_url: required_env("DATABASE_URL"),
            browserbase_api_key: required_env("BROWSERBASE_API_KEY"),
            browserbase_project_id: required_env("BROWSERBASE_PROJECT_ID"),
            browserbase_proxies: env_flag("BROWSERBASE_PROXIES"),
            browserbase_geo_city: env::var("BROWSERBASE_GEO_CITY").ok(),
            browserbase_geo_state: env::var("BROWSERBASE_GEO_STATE").ok(),
            browserbase_geo_country: env::var("BROWSERBASE_GEO_COUNTRY").ok(),
            ingest_url: env::var("INGEST_URL")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{web_port}/ingest/scraped-batch")),
            ingest_api_key: env::var("INGEST_API_KEY").ok(),
            discord_webhook_url: required_env("DISCORD_WEBHOOK_URL"),
            discord_webhook_url_alerts: env::var("DISCORD_WEBHOOK_URL_ALERTS").ok(),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            scrape_interval_minutes: env::var("SCRAPE_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            menu_locations_path: env::var("MENU_LOCATIONS_PATH")
                .unwrap_or_else(|_| "locations.json".to_string()),
        }
    }

    /// Load config for a standalone one-shot scraper run (no web server).
    pub fn scraper_from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            browserbase_api_key: required_env("BROWSERBASE_API_KEY"),
            browserbase_project_id: required_env("BROWSERBASE_PROJECT_ID"),
            browserbase_proxies: env_flag("BROWSERBASE_PROXIES"),
            browserbase_geo_city: env::var("BROWSERBASE_GEO_CITY").ok(),
            browserbase_geo_state: env::var("BROWSERBASE_GEO_STATE").ok(),
            browserbase_geo_country: env::var("BROWSERBASE_GEO_COUNTRY").ok(),
            ingest_url: required_env("INGEST_URL"),
            ingest_api_key: env::var("INGEST_API_KEY").ok(),
            discord_webhook_url: env::var("DISCORD_WEBHOOK_URL").unwrap_or_default(),
            discord_webhook_url_alerts: None,
            web_host: String::new(),
            web_port: 0,
            allowed_origins: Vec::new(),
            scrape_interval_minutes: 15,
            menu_locations_path: env::var("MENU_LOCATIONS_PATH")
                .unwrap_or_else(|_| "locations.json".to_string()),
        }
    }

    /// Log each sensitive var's presence without leaking its value.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("BROWSERBASE_API_KEY", &self.browserbase_api_key),
            ("BROWSERBASE_PROJECT_ID", &self.browserbase_project_id),
            ("DISCORD_WEBHOOK_URL", &self.discord_webhook_url),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
        tracing::info!(
            proxies = self.browserbase_proxies,
            interval_minutes = self.scrape_interval_minutes,
            locations = %self.menu_locations_path,
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_flag(key: &str) -> bool {
    matches!(
        env::var(key).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
