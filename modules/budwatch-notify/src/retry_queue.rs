//! Retry queue for failed webhook deliveries: exponential backoff, collapse
//! per webhook URL, terminal failure after the attempt budget runs out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use budwatch_ingest::store::{CatalogStore, NewQueueEntry};

use crate::sink::WebhookSink;

#[derive(Debug, Clone)]
pub struct RetryQueueConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Due rows processed per pass.
    pub batch_size: i64,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            batch_size: 10,
        }
    }
}

/// Backoff before the given attempt (1-indexed), capped at `max_delay`.
pub fn delay_for_attempt(config: &RetryQueueConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_multiplier
        .powi(attempt.saturating_sub(1) as i32);
    let raw = config.base_delay.as_millis() as f64 * exp;
    Duration::from_millis((raw as u64).min(config.max_delay.as_millis() as u64))
}

#[derive(Debug, PartialEq)]
pub enum RetryDecision {
    Reschedule { next_attempt: i32, delay: Duration },
    Fail,
}

/// What to do after a delivery failure for an entry currently at
/// `attempt_number`.
pub fn retry_decision(config: &RetryQueueConfig, attempt_number: i32) -> RetryDecision {
    let next_attempt = attempt_number + 1;
    if next_attempt >= config.max_retries as i32 {
        RetryDecision::Fail
    } else {
        RetryDecision::Reschedule {
            next_attempt,
            delay: delay_for_attempt(config, next_attempt as u32),
        }
    }
}

#[derive(Debug, Default)]
pub struct RetryStats {
    pub processed: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

impl std::fmt::Display for RetryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} delivered={} rescheduled={} failed={}",
            self.processed, self.delivered, self.rescheduled, self.failed
        )
    }
}

pub struct RetryQueue {
    store: CatalogStore,
    sink: Arc<dyn WebhookSink>,
    config: RetryQueueConfig,
}

impl RetryQueue {
    pub fn new(store: CatalogStore, sink: Arc<dyn WebhookSink>, config: RetryQueueConfig) -> Self {
        Self { store, sink, config }
    }

    /// Queue a failed delivery. Collapses into the pending entry for the same
    /// webhook URL when one exists; otherwise opens a new entry at attempt 1.
    pub async fn add_to_queue(
        &self,
        webhook_url: &str,
        payload: Value,
        event_ids: Vec<Uuid>,
        notification_type: &str,
        error_message: &str,
    ) -> Result<()> {
        let now = Utc::now();

        if let Some(existing) = self.store.pending_queue_entry_for(webhook_url).await? {
            self.store
                .merge_queue_entry(existing.id, &payload, &event_ids, Some(error_message))
                .await?;
            return Ok(());
        }

        let next_retry_at =
            now + chrono::Duration::from_std(delay_for_attempt(&self.config, 1)).unwrap_or_default();
        self.store
            .insert_queue_entry(
                &NewQueueEntry {
                    webhook_url: webhook_url.to_string(),
                    payload,
                    event_ids,
                    notification_type: notification_type.to_string(),
                    next_retry_at,
                    error_message: Some(error_message.to_string()),
                },
                now,
            )
            .await?;
        Ok(())
    }

    /// Re-deliver due entries. Late success still marks the attached events
    /// notified; exhaustion moves the entry to `failed` with a terminal
    /// message.
    pub async fn process_retries(&self) -> Result<RetryStats> {
        let now = Utc::now();
        let due = self.store.due_queue_entries(self.config.batch_size, now).await?;
        let mut stats = RetryStats::default();

        for entry in due {
            stats.processed += 1;
            match self.sink.post(&entry.webhook_url, &entry.payload).await {
                Ok(()) => {
                    let now = Utc::now();
                    self.store.mark_queue_delivered(entry.id, now).await?;
                    if let Some(event_ids) = &entry.event_ids {
                        self.store.mark_events_notified(event_ids, now).await?;
                    }
                    stats.delivered += 1;
                }
                Err(e) => match retry_decision(&self.config, entry.attempt_number) {
                    RetryDecision::Fail => {
                        let terminal = format!(
                            "exhausted after {} attempts: {e}",
                            entry.attempt_number + 1
                        );
                        warn!(entry_id = %entry.id, webhook = %entry.webhook_url, %terminal, "Delivery abandoned");
                        self.store
                            .mark_queue_failed(entry.id, &terminal, Utc::now())
                            .await?;
                        stats.failed += 1;
                    }
                    RetryDecision::Reschedule { next_attempt, delay } => {
                        let next_retry_at = Utc::now()
                            + chrono::Duration::from_std(delay).unwrap_or_default();
                        self.store
                            .reschedule_queue_entry(
                                entry.id,
                                next_attempt,
                                next_retry_at,
                                &e.to_string(),
                                Utc::now(),
                            )
                            .await?;
                        stats.rescheduled += 1;
                    }
                },
            }
        }

        if stats.processed > 0 {
            info!(%stats, "Retry queue pass complete");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_five_seconds_and_cap_at_five_minutes() {
        let config = RetryQueueConfig::default();
        assert_eq!(delay_for_attempt(&config, 1), Duration::from_secs(5));
        assert_eq!(delay_for_attempt(&config, 2), Duration::from_secs(10));
        assert_eq!(delay_for_attempt(&config, 3), Duration::from_secs(20));
        assert_eq!(delay_for_attempt(&config, 4), Duration::from_secs(40));
        assert_eq!(delay_for_attempt(&config, 5), Duration::from_secs(80));
        assert_eq!(delay_for_attempt(&config, 8), Duration::from_secs(300));
    }

    #[test]
    fn failures_reschedule_until_the_budget_runs_out() {
        let config = RetryQueueConfig::default();

        assert_eq!(
            retry_decision(&config, 1),
            RetryDecision::Reschedule {
                next_attempt: 2,
                delay: Duration::from_secs(10)
            }
        );
        assert_eq!(
            retry_decision(&config, 3),
            RetryDecision::Reschedule {
                next_attempt: 4,
                delay: Duration::from_secs(40)
            }
        );
        // Five total delivery attempts: the dispatcher's, then three queue
        // retries; the next failure is terminal.
        assert_eq!(retry_decision(&config, 4), RetryDecision::Fail);
    }
}
