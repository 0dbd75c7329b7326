//! NotificationDispatcher — fans unnotified events out to matching watches
//! and delivers them over webhooks. Failures enqueue into the retry queue;
//! an event is only marked notified once some delivery for it succeeded.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use budwatch_common::EventType;
use budwatch_ingest::models::{InventoryEvent, Watch};
use budwatch_ingest::store::CatalogStore;

use crate::message::{build_event_embed, watcher_code, MessageContext};
use crate::retry_queue::RetryQueue;
use crate::sink::WebhookSink;

/// Event types that reach consumers at all.
pub const ALERTABLE_TYPES: &[EventType] =
    &[EventType::Restock, EventType::PriceDrop, EventType::NewProduct];

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Events pulled from the store per pass.
    pub fetch_limit: i64,
    /// Events actually processed per pass.
    pub max_events: usize,
    /// Fallback when a watch has no webhook of its own.
    pub default_webhook_url: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            fetch_limit: 100,
            max_events: 50,
            default_webhook_url: String::new(),
        }
    }
}

#[derive(Debug, Default, serde::Serialize)]
pub struct DispatchStats {
    pub processed: usize,
    pub alerts_sent: usize,
    pub watches_notified: usize,
}

impl std::fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} alerts_sent={} watches_notified={}",
            self.processed, self.alerts_sent, self.watches_notified
        )
    }
}

/// Whether a watch consumes an event: the watch subscribes to the event's
/// alert code, and its retailer scope (when set) includes the retailer.
pub fn watch_matches(watch: &Watch, event: &InventoryEvent) -> bool {
    let Some(code) = watcher_code(event.event_type) else {
        return false;
    };
    if !watch.alert_types.iter().any(|t| t == code) {
        return false;
    }
    match &watch.retailer_ids {
        Some(ids) if !ids.is_empty() => ids.contains(&event.retailer_id),
        _ => true,
    }
}

pub struct NotificationDispatcher {
    store: CatalogStore,
    sink: Arc<dyn WebhookSink>,
    retry_queue: Arc<RetryQueue>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(
        store: CatalogStore,
        sink: Arc<dyn WebhookSink>,
        retry_queue: Arc<RetryQueue>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            sink,
            retry_queue,
            config,
        }
    }

    pub async fn run_once(&self) -> Result<DispatchStats> {
        let events = self.store.unnotified_events(self.config.fetch_limit).await?;
        let mut stats = DispatchStats::default();

        for event in events.iter().take(self.config.max_events) {
            let alertable =
                ALERTABLE_TYPES.contains(&event.event_type) && event.product_id.is_some();
            if !alertable {
                continue;
            }
            stats.processed += 1;

            if let Err(e) = self.dispatch_event(event, &mut stats).await {
                warn!(event_id = %event.id, error = %e, "Event dispatch failed");
            }
        }

        if stats.processed > 0 {
            info!(%stats, "Dispatch pass complete");
        }
        Ok(stats)
    }

    async fn dispatch_event(&self, event: &InventoryEvent, stats: &mut DispatchStats) -> Result<()> {
        let Some(product_id) = event.product_id else {
            return Ok(());
        };
        let watches = self.store.watches_for_product(product_id).await?;
        let matching: Vec<&Watch> = watches.iter().filter(|w| watch_matches(w, event)).collect();
        if matching.is_empty() {
            return Ok(());
        }

        let product = self.store.get_product(product_id).await?;
        let brand = match event.brand_id {
            Some(id) => self.store.get_brand(id).await?,
            None => None,
        };
        let retailer = self.store.get_retailer(event.retailer_id).await?;

        let mut delivered_any = false;
        for watch in matching {
            let ctx = MessageContext {
                product_name: product
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Unknown product".into()),
                brand_name: brand
                    .as_ref()
                    .map(|b| b.name.clone())
                    .unwrap_or_else(|| "Unknown brand".into()),
                retailer_name: retailer
                    .as_ref()
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| "Unknown retailer".into()),
                retailer_city: retailer.as_ref().and_then(|r| r.city.clone()),
                retailer_state: retailer.as_ref().and_then(|r| r.state.clone()),
                watcher_email: watch.email.clone(),
            };

            let Some(payload) = build_event_embed(event, &ctx) else {
                continue;
            };
            let webhook_url = watch
                .webhook_url
                .clone()
                .unwrap_or_else(|| self.config.default_webhook_url.clone());
            if webhook_url.is_empty() {
                warn!(watch_id = %watch.id, "No webhook URL for watch, skipping");
                continue;
            }

            match self.sink.post(&webhook_url, &payload).await {
                Ok(()) => {
                    delivered_any = true;
                    stats.alerts_sent += 1;
                    stats.watches_notified += 1;
                    self.store.touch_watch_notified(watch.id, Utc::now()).await?;
                }
                Err(e) => {
                    warn!(watch_id = %watch.id, error = %e, "Delivery failed, queueing for retry");
                    self.retry_queue
                        .add_to_queue(
                            &webhook_url,
                            payload,
                            vec![event.id],
                            "watch_alert",
                            &e.to_string(),
                        )
                        .await?;
                }
            }
        }

        // Never lose the event: it stays unnotified until a delivery lands,
        // either here or via the retry queue.
        if delivered_any {
            self.store
                .mark_events_notified(&[event.id], Utc::now())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn watch(alert_types: &[&str], retailer_ids: Option<Vec<Uuid>>) -> Watch {
        Watch {
            id: Uuid::new_v4(),
            email: "fan@example.com".into(),
            product_id: Some(Uuid::new_v4()),
            brand_id: None,
            retailer_ids,
            alert_types: alert_types.iter().map(|s| s.to_string()).collect(),
            webhook_url: None,
            is_active: true,
            created_at: Utc::now(),
            last_notified_at: None,
        }
    }

    fn event(event_type: EventType, retailer_id: Uuid) -> InventoryEvent {
        InventoryEvent {
            id: Uuid::new_v4(),
            retailer_id,
            product_id: Some(Uuid::new_v4()),
            brand_id: None,
            event_type,
            previous_value: None,
            new_value: Some(json!({ "price": 45.0 })),
            metadata: None,
            batch_id: "b1".into(),
            timestamp: Utc::now(),
            notified: false,
            notified_at: None,
        }
    }

    #[test]
    fn new_product_matches_the_new_drop_code() {
        let retailer = Uuid::new_v4();
        let e = event(EventType::NewProduct, retailer);
        assert!(watch_matches(&watch(&["new_drop"], None), &e));
        assert!(!watch_matches(&watch(&["restock"], None), &e));
    }

    #[test]
    fn retailer_scope_restricts_matches() {
        let retailer = Uuid::new_v4();
        let other = Uuid::new_v4();
        let e = event(EventType::Restock, retailer);

        assert!(watch_matches(&watch(&["restock"], None), &e));
        assert!(watch_matches(&watch(&["restock"], Some(vec![])), &e));
        assert!(watch_matches(&watch(&["restock"], Some(vec![retailer])), &e));
        assert!(!watch_matches(&watch(&["restock"], Some(vec![other])), &e));
    }

    #[test]
    fn non_alertable_events_never_match() {
        let e = event(EventType::SoldOut, Uuid::new_v4());
        assert!(!watch_matches(&watch(&["restock", "price_drop", "new_drop"], None), &e));
    }
}
