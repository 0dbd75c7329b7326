//! IngestionEngine — consumes a scraped batch, upserts the catalog, appends
//! snapshots, and detects deltas against current inventory. One transaction
//! per item touch; per-item errors are counted, never fatal to the batch.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use budwatch_common::{ErrorKind, LocationStatus, ScrapeBatch, ScrapedItem};

use crate::delta::{apply_observation, removed_event, Observation};
use crate::models::{JobStatus, NewSnapshot};
use crate::normalizer::{match_category, normalize, normalize_key, NormalizeInput};
use crate::store::{CatalogStore, NewProductRow, NewScrapeJob};

/// Rows older than this when the sweep runs are treated as gone from the menu.
fn removed_staleness() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_events_detected: u64,
    pub event_breakdown: BTreeMap<String, u64>,
    pub batch_id: String,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batch={} processed={} failed={} events={}",
            self.batch_id, self.total_processed, self.total_failed, self.total_events_detected
        )
    }
}

pub struct IngestionEngine {
    store: CatalogStore,
}

impl IngestionEngine {
    pub fn new(store: CatalogStore) -> Self {
        Self { store }
    }

    /// Ingest one batch. Every event produced here shares the batch id and a
    /// single timestamp taken at ingestion start.
    pub async fn ingest_batch(&self, batch: &ScrapeBatch) -> Result<IngestSummary> {
        let now = Utc::now();
        let mut summary = IngestSummary {
            batch_id: batch.batch_id.clone(),
            ..Default::default()
        };

        for result in &batch.results {
            let started_at = now;
            let source_url = result
                .items
                .first()
                .map(|i| i.source_url.clone())
                .unwrap_or_default();
            let source_platform = result
                .items
                .first()
                .map(|i| i.source_platform.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            if result.status == LocationStatus::Error {
                let message = result.error.clone().unwrap_or_else(|| "unknown error".into());
                let error_type = classify_error_type(&message);

                summary.total_failed += result.items.len() as u64;
                self.store
                    .record_dead_letter(result.retailer_id, &error_type, &message, now)
                    .await?;
                self.store
                    .insert_scrape_job(&NewScrapeJob {
                        retailer_id: result.retailer_id,
                        source_platform,
                        source_url,
                        batch_id: batch.batch_id.clone(),
                        status: JobStatus::Failed,
                        started_at,
                        completed_at: Some(Utc::now()),
                        items_scraped: 0,
                        items_failed: result.items.len() as i32,
                        error_message: Some(message),
                        retry_count: 0,
                    })
                    .await?;
                continue;
            }

            let mut processed = 0u64;
            let mut failed = 0u64;

            for item in &result.items {
                match self
                    .ingest_item(result.retailer_id, item, &batch.batch_id, now)
                    .await
                {
                    Ok(kinds) => {
                        processed += 1;
                        for kind in kinds {
                            summary.total_events_detected += 1;
                            *summary.event_breakdown.entry(kind).or_insert(0) += 1;
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        warn!(
                            retailer_id = %result.retailer_id,
                            product = %item.raw_product_name,
                            error = %e,
                            "Item ingestion failed"
                        );
                    }
                }
            }

            // Removed sweep: rows for this retailer the batch did not touch
            // and that have been stale for over an hour, whatever their
            // stock state.
            let cutoff = now - removed_staleness();
            match self.store.stale_inventory(result.retailer_id, cutoff).await {
                Ok(stale) => {
                    for row in stale {
                        let draft = removed_event(&row);
                        self.store
                            .insert_event_direct(
                                row.retailer_id,
                                Some(row.product_id),
                                Some(row.brand_id),
                                &draft,
                                &batch.batch_id,
                                now,
                            )
                            .await?;
                        self.store.mark_removed(row.id, now).await?;
                        summary.total_events_detected += 1;
                        *summary
                            .event_breakdown
                            .entry("removed".to_string())
                            .or_insert(0) += 1;
                    }
                }
                Err(e) => warn!(retailer_id = %result.retailer_id, error = %e, "Removed sweep failed"),
            }

            self.store
                .insert_scrape_job(&NewScrapeJob {
                    retailer_id: result.retailer_id,
                    source_platform,
                    source_url: source_url.clone(),
                    batch_id: batch.batch_id.clone(),
                    status: JobStatus::Completed,
                    started_at,
                    completed_at: Some(Utc::now()),
                    items_scraped: processed as i32,
                    items_failed: failed as i32,
                    error_message: None,
                    retry_count: 0,
                })
                .await?;

            if !source_url.is_empty() {
                if let Err(e) = self
                    .store
                    .touch_retailer_scraped(result.retailer_id, &source_url, now)
                    .await
                {
                    warn!(retailer_id = %result.retailer_id, error = %e, "Failed to stamp retailer scrape time");
                }
            }
            if let Err(e) = self.store.resolve_dead_letters(result.retailer_id, now).await {
                warn!(retailer_id = %result.retailer_id, error = %e, "Failed to resolve dead letters");
            }

            summary.total_processed += processed;
            summary.total_failed += failed;
        }

        info!(%summary, "Batch ingested");
        Ok(summary)
    }

    /// Brand upsert → normalize → product upsert → snapshot append → delta.
    /// All inside one transaction keyed by the (retailer, product) row lock.
    async fn ingest_item(
        &self,
        retailer_id: Uuid,
        item: &ScrapedItem,
        batch_id: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let brand_name = if item.raw_brand_name.trim().is_empty() {
            "Unknown"
        } else {
            item.raw_brand_name.trim()
        };
        let normalized_brand = normalize_key(brand_name);

        let normalized = normalize(&NormalizeInput {
            raw_name: &item.raw_product_name,
            raw_brand: Some(brand_name),
            raw_category: item.raw_category.as_deref(),
            raw_thc: item.thc_formatted.as_deref(),
            raw_cbd: item.cbd_formatted.as_deref(),
        });
        if normalized.name.is_empty() {
            bail!("normalization produced an empty product name for {:?}", item.raw_product_name);
        }

        let mut tx = self.store.begin().await?;

        let brand_category = item
            .raw_category
            .as_deref()
            .and_then(match_category)
            .map(|c| c.to_string());
        let brand_id = self
            .store
            .upsert_brand(&mut tx, brand_name, &normalized_brand, brand_category.as_deref(), now)
            .await?;

        let product_id = self
            .store
            .upsert_product(
                &mut tx,
                brand_id,
                &NewProductRow {
                    name: normalized.name.clone(),
                    normalized_name: normalize_key(&normalized.name),
                    category: normalized.category.to_string(),
                    strain: normalized.strain.map(|s| s.to_string()),
                    weight_amount: normalized.weight.map(|w| w.amount),
                    weight_unit: normalized.weight.map(|w| w.unit.to_string()),
                    thc: normalized.thc,
                    cbd: normalized.cbd,
                    image_url: item.image_url.clone(),
                },
                now,
            )
            .await?;

        let (is_on_sale, discount_percent) = sale_fields(item.price, item.original_price);
        let snapshot_id = self
            .store
            .insert_snapshot(
                &mut tx,
                &NewSnapshot {
                    retailer_id,
                    product_id,
                    scraped_at: item.scraped_at,
                    batch_id: batch_id.to_string(),
                    price: item.price,
                    original_price: item.original_price,
                    is_on_sale,
                    discount_percent,
                    in_stock: item.in_stock,
                    quantity: item.quantity,
                    quantity_warning: item.quantity_warning.clone(),
                    quantity_source: item.quantity_source,
                    source_url: item.source_url.clone(),
                    source_platform: item.source_platform.to_string(),
                    raw_product_name: item.raw_product_name.clone(),
                    raw_brand_name: item.raw_brand_name.clone(),
                    raw_category: item.raw_category.clone(),
                },
            )
            .await?;

        let prev = self
            .store
            .inventory_for_update(&mut tx, retailer_id, product_id)
            .await?;

        let obs = Observation {
            price: item.price,
            in_stock: item.in_stock,
            quantity: item.quantity,
            quantity_warning: item.quantity_warning.clone(),
            quantity_source: item.quantity_source,
        };
        let (state, drafts) = apply_observation(prev.as_ref(), &obs, now);

        match &prev {
            Some(row) => {
                self.store
                    .update_inventory(&mut tx, row.id, &state, snapshot_id)
                    .await?;
            }
            None => {
                self.store
                    .insert_inventory(&mut tx, retailer_id, brand_id, product_id, &state, snapshot_id)
                    .await?;
            }
        }

        let mut kinds = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            self.store
                .insert_event(
                    &mut tx,
                    retailer_id,
                    Some(product_id),
                    Some(brand_id),
                    draft,
                    batch_id,
                    now,
                )
                .await?;
            kinds.push(draft.event_type.to_string());
        }

        tx.commit().await?;
        Ok(kinds)
    }
}

/// Sale flags for a snapshot: on sale when a higher original price exists;
/// discount is a whole-number percentage.
pub fn sale_fields(price: f64, original_price: Option<f64>) -> (bool, Option<i32>) {
    match original_price {
        Some(original) if price < original && original > 0.0 => {
            let discount = ((original - price) / original * 100.0).round() as i32;
            (true, Some(discount))
        }
        _ => (false, None),
    }
}

/// Map a location error message to a dead-letter error type. The orchestrator
/// prefixes messages with the wire-level kind ("blocked: cf-turnstile ...").
pub fn classify_error_type(message: &str) -> String {
    if let Some((prefix, _)) = message.split_once(':') {
        if let Ok(kind) = prefix.trim().parse::<ErrorKind>() {
            return kind.to_string();
        }
    }
    let folded = message.to_lowercase();
    if folded.contains("429") || folded.contains("rate limit") {
        ErrorKind::RateLimit.to_string()
    } else if folded.contains("timed out") || folded.contains("timeout") {
        ErrorKind::Timeout.to_string()
    } else if folded.contains("navigat") {
        ErrorKind::NavigationFailed.to_string()
    } else {
        "unknown".to_string()
    }
}
