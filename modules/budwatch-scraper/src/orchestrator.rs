//! Per-tick driver: walks the curated location set, runs the matching
//! extractor with bounded retries, aggregates one batch, and posts it to the
//! ingestion endpoint. Ticks are single-flight; a tick that fires while the
//! previous one is still running is skipped, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use browserbase_client::{BrowserConfig, BrowserHandle, BrowserbaseClient};
use budwatch_common::{
    fetch_with_retry, with_retry, CircuitError, CircuitOptions, CircuitRegistry, ErrorKind,
    FetchOptions, LocationResult, LocationStatus, MenuLocation, RetryOptions, ScrapeBatch,
    SourcePlatform,
};

use crate::detect::PlatformDetector;
use crate::error::ScrapeError;
use crate::extract::{AjaxExtractor, EmbeddedConfig, EmbeddedExtractor, SsrExtractor};
use crate::summary::{build_summary_embed, post_operator_summary};

const BROWSER_CIRCUIT_KEY: &str = "browserbase";

/// Pause between locations, for per-vendor pacing.
const LOCATION_PAUSE: Duration = Duration::from_secs(2);

const LOCATION_ATTEMPTS: u32 = 3;

pub struct OrchestratorConfig {
    pub locations: Vec<MenuLocation>,
    pub browser: BrowserbaseClient,
    pub browser_config: BrowserConfig,
    pub circuits: Arc<CircuitRegistry>,
    pub ingest_url: String,
    pub ingest_api_key: Option<String>,
    pub operator_webhook: Option<String>,
}

/// What one tick did, for the operator summary and the ops endpoints.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub batch_id: String,
    pub skipped: bool,
    pub locations_succeeded: usize,
    pub locations_failed: usize,
    pub total_items: usize,
    pub errors: Vec<String>,
    pub ingest_response: Option<Value>,
}

pub struct Orchestrator {
    locations: Vec<MenuLocation>,
    browser: BrowserbaseClient,
    browser_config: BrowserConfig,
    circuits: Arc<CircuitRegistry>,
    http: reqwest::Client,
    ingest_url: String,
    ingest_api_key: Option<String>,
    operator_webhook: Option<String>,
    detector: PlatformDetector,
    ssr: SsrExtractor,
    ajax: AjaxExtractor,
    embedded: EmbeddedExtractor,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            locations: config.locations,
            browser: config.browser,
            browser_config: config.browser_config,
            circuits: config.circuits,
            http: reqwest::Client::new(),
            ingest_url: config.ingest_url,
            ingest_api_key: config.ingest_api_key,
            operator_webhook: config.operator_webhook,
            detector: PlatformDetector::new(),
            ssr: SsrExtractor::new(),
            ajax: AjaxExtractor::new(),
            embedded: EmbeddedExtractor::new(EmbeddedConfig::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn locations(&self) -> &[MenuLocation] {
        &self.locations
    }

    /// Run one tick. Returns a skipped outcome when a prior tick still holds
    /// the flight flag.
    pub async fn tick(&self) -> TickOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Previous tick still running, skipping this one");
            return TickOutcome {
                skipped: true,
                ..Default::default()
            };
        }

        let outcome = self.run_tick().await;
        self.running.store(false, Ordering::SeqCst);

        if !outcome.skipped {
            if let Some(webhook) = &self.operator_webhook {
                let embed = build_summary_embed(&outcome);
                post_operator_summary(&self.http, webhook, embed).await;
            }
        }

        outcome
    }

    async fn run_tick(&self) -> TickOutcome {
        let batch_id = Uuid::new_v4().to_string();
        info!(batch_id = %batch_id, "Scrape tick starting");

        let active: Vec<&MenuLocation> = self
            .locations
            .iter()
            .filter(|loc| {
                if !loc.active {
                    info!(
                        retailer = %loc.retailer_name,
                        reason = loc.disabled_reason.as_deref().unwrap_or("disabled"),
                        "Skipping disabled location"
                    );
                }
                loc.active
            })
            .collect();

        let needs_browser = active
            .iter()
            .any(|loc| self.platform_hint(loc) != Some(SourcePlatform::Dutchie));
        let browser = if needs_browser {
            self.acquire_browser().await
        } else {
            None
        };

        let mut outcome = TickOutcome {
            batch_id: batch_id.clone(),
            ..Default::default()
        };
        let mut results = Vec::with_capacity(active.len());

        for (i, loc) in active.iter().enumerate() {
            match self.scrape_with_attempts(loc, browser.as_ref()).await {
                Ok(items) => {
                    info!(retailer = %loc.retailer_name, items = items.len(), "Location scraped");
                    outcome.locations_succeeded += 1;
                    outcome.total_items += items.len();
                    results.push(LocationResult {
                        retailer_id: loc.retailer_id,
                        status: LocationStatus::Ok,
                        error: None,
                        items,
                    });
                }
                Err(e) => {
                    warn!(retailer = %loc.retailer_name, error = %e, "Location failed");
                    outcome.locations_failed += 1;
                    outcome.errors.push(format!("{}: {e}", loc.retailer_name));
                    results.push(LocationResult {
                        retailer_id: loc.retailer_id,
                        status: LocationStatus::Error,
                        error: Some(e.to_string()),
                        items: Vec::new(),
                    });
                }
            }

            if i + 1 < active.len() {
                tokio::time::sleep(LOCATION_PAUSE).await;
            }
        }

        if let Some(handle) = &browser {
            handle.page.close().await;
            handle.session.close().await;
        }

        let batch = ScrapeBatch { batch_id, results };
        match self.post_batch(&batch).await {
            Ok(response) => outcome.ingest_response = Some(response),
            Err(e) => {
                error!(error = %e, "Failed to deliver batch to ingestion");
                outcome.errors.push(format!("ingest: {e}"));
            }
        }

        info!(
            succeeded = outcome.locations_succeeded,
            failed = outcome.locations_failed,
            items = outcome.total_items,
            "Scrape tick complete"
        );
        outcome
    }

    fn platform_hint(&self, loc: &MenuLocation) -> Option<SourcePlatform> {
        loc.platform.or_else(|| self.detector.detect_url(&loc.url))
    }

    /// Acquire a session under the browser circuit breaker, with three
    /// retries. A terminal failure leaves browser locations to fail with
    /// `browser_unavailable` individually.
    async fn acquire_browser(&self) -> Option<BrowserHandle> {
        let retry = RetryOptions {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retryable_errors: vec![
                "unavailable".to_string(),
                "timeout".to_string(),
                "timed out".to_string(),
                "network".to_string(),
                "channel".to_string(),
                "api error".to_string(),
            ],
        };
        let circuit_opts = CircuitOptions {
            failure_threshold: 3,
            reset_time: Duration::from_secs(120),
            half_open_requests: 1,
        };

        let result = with_retry("browser_acquire", &retry, || {
            self.circuits.call(BROWSER_CIRCUIT_KEY, &circuit_opts, || {
                self.browser.acquire(&self.browser_config)
            })
        })
        .await;

        match result {
            Ok(handle) => Some(handle),
            Err(CircuitError::Open { retry_after, .. }) => {
                error!(
                    retry_after_s = retry_after.as_secs(),
                    "Browser circuit open, running without a session"
                );
                None
            }
            Err(CircuitError::Inner(e)) => {
                error!(error = %e, "Browser acquisition failed after retries");
                None
            }
        }
    }

    async fn scrape_with_attempts(
        &self,
        loc: &MenuLocation,
        browser: Option<&BrowserHandle>,
    ) -> Result<Vec<budwatch_common::ScrapedItem>, ScrapeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.scrape_location(loc, browser).await {
                Ok(items) => return Ok(items),
                Err(e)
                    if attempt < LOCATION_ATTEMPTS
                        && e.kind != ErrorKind::Blocked
                        && e.kind != ErrorKind::BrowserUnavailable =>
                {
                    let delay = Duration::from_secs(2 * attempt as u64);
                    warn!(
                        retailer = %loc.retailer_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying location"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn scrape_location(
        &self,
        loc: &MenuLocation,
        browser: Option<&BrowserHandle>,
    ) -> Result<Vec<budwatch_common::ScrapedItem>, ScrapeError> {
        let platform = match self.platform_hint(loc) {
            Some(platform) => platform,
            None => self.detect_by_content(&loc.url).await?,
        };

        match platform {
            SourcePlatform::Dutchie => self.ssr.extract(&loc.url).await,
            SourcePlatform::Leafbridge => {
                let handle = browser.ok_or_else(no_browser)?;
                self.ajax.extract(&handle.page, &loc.url).await
            }
            SourcePlatform::DutchieEmbedded => {
                let handle = browser.ok_or_else(no_browser)?;
                self.embedded
                    .extract(&handle.session, &handle.page, &loc.url)
                    .await
            }
        }
    }

    /// One plain fetch to classify a target neither the config nor the URL
    /// could place.
    async fn detect_by_content(&self, url: &str) -> Result<SourcePlatform, ScrapeError> {
        let resp = self
            .http
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ScrapeError::new(ErrorKind::NavigationFailed, e.to_string()))?;
        let html = resp
            .text()
            .await
            .map_err(|e| ScrapeError::new(ErrorKind::NavigationFailed, e.to_string()))?;
        self.detector
            .detect(url, Some(&html))
            .ok_or_else(|| ScrapeError::parse_failed(format!("unknown menu platform at {url}")))
    }

    /// Deliver the batch with up to 3 retries and a 60s timeout per attempt.
    async fn post_batch(&self, batch: &ScrapeBatch) -> Result<Value, budwatch_common::BudwatchError> {
        let opts = FetchOptions {
            timeout: Duration::from_secs(60),
            retry: RetryOptions {
                max_retries: 3,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
                retryable_errors: vec![],
            },
        };

        let resp = fetch_with_retry(
            || {
                let mut req = self.http.post(&self.ingest_url).json(batch);
                if let Some(key) = &self.ingest_api_key {
                    req = req.header("X-API-Key", key);
                }
                req
            },
            &opts,
        )
        .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(budwatch_common::BudwatchError::Http(format!(
                "ingest returned {status}: {body}"
            )));
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }
}

fn no_browser() -> ScrapeError {
    ScrapeError::new(
        ErrorKind::BrowserUnavailable,
        "no browser session available for this tick",
    )
}
