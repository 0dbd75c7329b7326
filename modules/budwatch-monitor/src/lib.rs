//! HealthMonitor — periodic evaluation of scrape-fleet health. Each
//! condition has a severity ladder and its own alert cooldown; `force`
//! bypasses the cooldowns.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use budwatch_ingest::models::Retailer;
use budwatch_ingest::store::{CatalogStore, NewAlert};
use budwatch_notify::WebhookSink;

const COLOR_MEDIUM: u32 = 0xE67E22;
const COLOR_HIGH: u32 = 0xE74C3C;
const COLOR_CRITICAL: u32 = 0x992D22;

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Per-condition alert cooldown.
    pub cooldown: Duration,
    /// Lookback for dead letters and job counts.
    pub window: Duration,
    /// A retailer not scraped within this is stale.
    pub stale_after: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(15 * 60),
            window: Duration::from_secs(60 * 60),
            stale_after: Duration::from_secs(45 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl Severity {
    fn color(&self) -> u32 {
        match self {
            Severity::Medium => COLOR_MEDIUM,
            Severity::High => COLOR_HIGH,
            Severity::Critical => COLOR_CRITICAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggeredCondition {
    pub condition: &'static str,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct HealthCheckOutcome {
    pub triggered: Vec<String>,
    pub alerted: Vec<String>,
    pub suppressed: Vec<String>,
}

// --- Severity ladders ---

pub fn severity_for_new_failures(count: i64) -> Option<Severity> {
    match count {
        c if c >= 10 => Some(Severity::Critical),
        c if c >= 5 => Some(Severity::High),
        c if c >= 3 => Some(Severity::Medium),
        _ => None,
    }
}

pub fn severity_for_failure_rate(failed: i64, total: i64) -> Option<Severity> {
    if total == 0 {
        return None;
    }
    let rate = failed as f64 / total as f64;
    if rate >= 0.5 {
        Some(Severity::Critical)
    } else if rate >= 0.3 {
        Some(Severity::High)
    } else if rate >= 0.2 {
        Some(Severity::Medium)
    } else {
        None
    }
}

pub fn severity_for_stale_scrapers(stale: i64, active: i64) -> Option<Severity> {
    if stale < 3 {
        return None;
    }
    if active > 0 && stale * 2 >= active {
        Some(Severity::High)
    } else {
        Some(Severity::Medium)
    }
}

pub fn severity_for_rate_limit_spike(count: i64) -> Option<Severity> {
    match count {
        c if c >= 10 => Some(Severity::Critical),
        c if c >= 5 => Some(Severity::High),
        _ => None,
    }
}

/// Count active retailers whose primary menu source was last scraped before
/// the cutoff. Never-scraped retailers are still warming up, not stale.
pub fn stale_retailer_count(retailers: &[Retailer], cutoff: DateTime<Utc>) -> i64 {
    retailers
        .iter()
        .filter(|r| {
            r.menu_sources
                .first()
                .and_then(|s| s.last_scraped_at)
                .map(|t| t < cutoff)
                .unwrap_or(false)
        })
        .count() as i64
}

pub struct HealthMonitor {
    store: CatalogStore,
    sink: Arc<dyn WebhookSink>,
    webhook_url: String,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    pub fn new(
        store: CatalogStore,
        sink: Arc<dyn WebhookSink>,
        webhook_url: String,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            store,
            sink,
            webhook_url,
            config,
        }
    }

    pub async fn check_and_alert(&self, force: bool) -> Result<HealthCheckOutcome> {
        let now = Utc::now();
        let window_start = now - chrono::Duration::from_std(self.config.window)?;
        let stale_cutoff = now - chrono::Duration::from_std(self.config.stale_after)?;

        let unresolved = self.store.unresolved_dead_letters_since(window_start).await?;
        let (total_jobs, failed_jobs) = self.store.job_counts_since(window_start).await?;
        let rate_limited = self
            .store
            .dead_letters_of_type_since("rate_limit", window_start)
            .await?;
        let retailers = self.store.active_retailers().await?;
        let stale = stale_retailer_count(&retailers, stale_cutoff);
        let active = retailers.len() as i64;

        let mut conditions = Vec::new();
        if let Some(severity) = severity_for_new_failures(unresolved) {
            conditions.push(TriggeredCondition {
                condition: "new_failures",
                severity,
                detail: format!("{unresolved} unresolved dead letters in the last hour"),
            });
        }
        if let Some(severity) = severity_for_failure_rate(failed_jobs, total_jobs) {
            conditions.push(TriggeredCondition {
                condition: "high_failure_rate",
                severity,
                detail: format!("{failed_jobs}/{total_jobs} scrape jobs failed in the last hour"),
            });
        }
        if let Some(severity) = severity_for_stale_scrapers(stale, active) {
            conditions.push(TriggeredCondition {
                condition: "stale_scraper",
                severity,
                detail: format!("{stale}/{active} active retailers not scraped in 45 minutes"),
            });
        }
        if let Some(severity) = severity_for_rate_limit_spike(rate_limited) {
            conditions.push(TriggeredCondition {
                condition: "rate_limit_spike",
                severity,
                detail: format!("{rate_limited} rate-limit dead letters in the last hour"),
            });
        }

        let failure_rate = if total_jobs > 0 {
            failed_jobs as f64 / total_jobs as f64
        } else {
            0.0
        };
        let snapshot = format!(
            "unresolved: {unresolved} · jobs last hour: {total_jobs} · failure rate: {:.0}%",
            failure_rate * 100.0
        );

        let mut outcome = HealthCheckOutcome::default();
        for condition in conditions {
            outcome.triggered.push(condition.condition.to_string());

            if !force {
                if let Some(last) = self.store.last_alert_at(condition.condition).await? {
                    let cooldown = chrono::Duration::from_std(self.config.cooldown)?;
                    if now - last < cooldown {
                        info!(condition = condition.condition, "Alert suppressed by cooldown");
                        outcome.suppressed.push(condition.condition.to_string());
                        continue;
                    }
                }
            }

            let title = format!("⚠️ Scraper health: {}", condition.condition);
            let payload = json!({
                "embeds": [{
                    "title": title,
                    "description": format!(
                        "**Severity:** {}\n{}\n\n{snapshot}",
                        condition.severity, condition.detail
                    ),
                    "color": condition.severity.color(),
                }]
            });

            let delivered_to = match self.sink.post(&self.webhook_url, &payload).await {
                Ok(()) => vec!["discord".to_string()],
                Err(e) => {
                    warn!(condition = condition.condition, error = %e, "Alert delivery failed");
                    vec![]
                }
            };

            self.store
                .insert_alert(
                    &NewAlert {
                        alert_type: condition.condition.to_string(),
                        severity: condition.severity.to_string(),
                        title,
                        message: condition.detail.clone(),
                        data: Some(json!({
                            "unresolved": unresolved,
                            "jobsLastHour": total_jobs,
                            "failedJobsLastHour": failed_jobs,
                            "rateLimited": rate_limited,
                            "staleRetailers": stale,
                        })),
                        delivered_to,
                    },
                    now,
                )
                .await?;
            outcome.alerted.push(condition.condition.to_string());
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use budwatch_ingest::models::MenuSource;
    use uuid::Uuid;

    #[test]
    fn new_failures_ladder() {
        assert_eq!(severity_for_new_failures(2), None);
        assert_eq!(severity_for_new_failures(3), Some(Severity::Medium));
        assert_eq!(severity_for_new_failures(5), Some(Severity::High));
        assert_eq!(severity_for_new_failures(10), Some(Severity::Critical));
    }

    #[test]
    fn failure_rate_ladder() {
        assert_eq!(severity_for_failure_rate(1, 10), None);
        assert_eq!(severity_for_failure_rate(2, 10), Some(Severity::Medium));
        assert_eq!(severity_for_failure_rate(3, 10), Some(Severity::High));
        assert_eq!(severity_for_failure_rate(5, 10), Some(Severity::Critical));
        assert_eq!(severity_for_failure_rate(0, 0), None);
    }

    #[test]
    fn stale_scraper_ladder_scales_with_fleet() {
        assert_eq!(severity_for_stale_scrapers(2, 10), None);
        assert_eq!(severity_for_stale_scrapers(3, 10), Some(Severity::Medium));
        assert_eq!(severity_for_stale_scrapers(5, 10), Some(Severity::High));
        assert_eq!(severity_for_stale_scrapers(3, 6), Some(Severity::High));
    }

    #[test]
    fn rate_limit_ladder_starts_at_high() {
        assert_eq!(severity_for_rate_limit_spike(4), None);
        assert_eq!(severity_for_rate_limit_spike(5), Some(Severity::High));
        assert_eq!(severity_for_rate_limit_spike(10), Some(Severity::Critical));
    }

    #[test]
    fn never_scraped_retailers_are_not_stale() {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::minutes(45);
        let retailer = |last: Option<DateTime<Utc>>| Retailer {
            id: Uuid::new_v4(),
            name: "R".into(),
            slug: "r".into(),
            license_number: None,
            street: None,
            city: None,
            state: None,
            zip: None,
            lat: None,
            lng: None,
            region: None,
            is_active: true,
            menu_sources: vec![MenuSource {
                url: "u".into(),
                platform: "dutchie".into(),
                last_scraped_at: last,
            }],
        };

        let retailers = vec![
            retailer(None),
            retailer(Some(now - chrono::Duration::minutes(10))),
            retailer(Some(now - chrono::Duration::minutes(90))),
        ];
        assert_eq!(stale_retailer_count(&retailers, cutoff), 1);
    }
}
