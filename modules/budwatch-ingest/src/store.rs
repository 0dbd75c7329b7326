//! CatalogStore — Postgres persistence for the catalog, snapshots, current
//! inventory, events, and the operational tables (jobs, dead letters,
//! notification queue, alerts, watches).
//!
//! Per-pair serialization relies on `SELECT ... FOR UPDATE` against the
//! unique `(retailer_id, product_id)` inventory row: two batches touching the
//! same pair queue on the row lock, while different pairs commit in parallel.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::delta::{EventDraft, InventoryState};
use crate::models::{
    Brand, CurrentInventory, InventoryEvent, JobStatus, NewSnapshot, NotificationQueueEntry,
    Product, QueueStatus, Retailer, Watch,
};

/// Fields for a product row insert; upserts refresh `last_seen_at` only.
#[derive(Debug, Clone)]
pub struct NewProductRow {
    pub name: String,
    pub normalized_name: String,
    pub category: String,
    pub strain: Option<String>,
    pub weight_amount: Option<f64>,
    pub weight_unit: Option<String>,
    pub thc: Option<f64>,
    pub cbd: Option<f64>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewScrapeJob {
    pub retailer_id: Uuid,
    pub source_platform: String,
    pub source_url: String,
    pub batch_id: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_scraped: i32,
    pub items_failed: i32,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub webhook_url: String,
    pub payload: Value,
    pub event_ids: Vec<Uuid>,
    pub notification_type: String,
    pub next_retry_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub data: Option<Value>,
    pub delivered_to: Vec<String>,
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: PgPool,
}

impl CatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    // -----------------------------------------------------------------------
    // Retailers
    // -----------------------------------------------------------------------

    pub async fn upsert_retailer(&self, retailer: &Retailer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retailers (id, name, slug, license_number, street, city, state, zip,
                                   lat, lng, region, is_active, menu_sources)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                is_active = EXCLUDED.is_active,
                menu_sources = EXCLUDED.menu_sources
            "#,
        )
        .bind(retailer.id)
        .bind(&retailer.name)
        .bind(&retailer.slug)
        .bind(&retailer.license_number)
        .bind(&retailer.street)
        .bind(&retailer.city)
        .bind(&retailer.state)
        .bind(&retailer.zip)
        .bind(retailer.lat)
        .bind(retailer.lng)
        .bind(&retailer.region)
        .bind(retailer.is_active)
        .bind(serde_json::to_value(&retailer.menu_sources)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_retailer(&self, id: Uuid) -> Result<Option<Retailer>> {
        let row = sqlx::query_as::<_, Retailer>("SELECT * FROM retailers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn active_retailers(&self) -> Result<Vec<Retailer>> {
        let rows = sqlx::query_as::<_, Retailer>(
            "SELECT * FROM retailers WHERE is_active = TRUE ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stamp the matching menu source's `last_scraped_at`.
    pub async fn touch_retailer_scraped(
        &self,
        retailer_id: Uuid,
        source_url: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(mut retailer) = self.get_retailer(retailer_id).await? else {
            return Ok(());
        };
        for source in &mut retailer.menu_sources {
            if source.url == source_url {
                source.last_scraped_at = Some(now);
            }
        }
        sqlx::query("UPDATE retailers SET menu_sources = $2 WHERE id = $1")
            .bind(retailer_id)
            .bind(serde_json::to_value(&retailer.menu_sources)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Catalog upserts
    // -----------------------------------------------------------------------

    pub async fn upsert_brand(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        raw_name: &str,
        normalized_name: &str,
        category: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO brands (id, name, normalized_name, aliases, category, is_verified, first_seen_at)
            VALUES ($1, $2, $3, '{}', $4, FALSE, $5)
            ON CONFLICT (normalized_name) DO UPDATE SET normalized_name = EXCLUDED.normalized_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(raw_name)
        .bind(normalized_name)
        .bind(category)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.0)
    }

    pub async fn upsert_product(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        brand_id: Uuid,
        product: &NewProductRow,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO products (id, brand_id, name, normalized_name, category, strain,
                                  weight_amount, weight_unit, thc_min, thc_max, cbd_min, cbd_max,
                                  image_url, is_active, first_seen_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10, $10, $11, TRUE, $12, $12)
            ON CONFLICT (brand_id, normalized_name) DO UPDATE
            SET last_seen_at = EXCLUDED.last_seen_at,
                is_active = TRUE
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(brand_id)
        .bind(&product.name)
        .bind(&product.normalized_name)
        .bind(&product.category)
        .bind(&product.strain)
        .bind(product.weight_amount)
        .bind(&product.weight_unit)
        .bind(product.thc)
        .bind(product.cbd)
        .bind(&product.image_url)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.0)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_brand(&self, id: Uuid) -> Result<Option<Brand>> {
        let row = sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn insert_snapshot(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        snap: &NewSnapshot,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO menu_snapshots (id, retailer_id, product_id, scraped_at, batch_id, price,
                                        original_price, is_on_sale, discount_percent, in_stock,
                                        quantity, quantity_warning, quantity_source, source_url,
                                        source_platform, raw_product_name, raw_brand_name, raw_category)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(id)
        .bind(snap.retailer_id)
        .bind(snap.product_id)
        .bind(snap.scraped_at)
        .bind(&snap.batch_id)
        .bind(snap.price)
        .bind(snap.original_price)
        .bind(snap.is_on_sale)
        .bind(snap.discount_percent)
        .bind(snap.in_stock)
        .bind(snap.quantity)
        .bind(&snap.quantity_warning)
        .bind(snap.quantity_source.to_string())
        .bind(&snap.source_url)
        .bind(&snap.source_platform)
        .bind(&snap.raw_product_name)
        .bind(&snap.raw_brand_name)
        .bind(&snap.raw_category)
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Current inventory
    // -----------------------------------------------------------------------

    pub async fn inventory_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        retailer_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<CurrentInventory>> {
        let row = sqlx::query_as::<_, CurrentInventory>(
            r#"
            SELECT * FROM current_inventory
            WHERE retailer_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(retailer_id)
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    pub async fn insert_inventory(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        retailer_id: Uuid,
        brand_id: Uuid,
        product_id: Uuid,
        state: &InventoryState,
        snapshot_id: Uuid,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO current_inventory (id, retailer_id, brand_id, product_id, current_price,
                                           previous_price, price_changed_at, in_stock,
                                           last_in_stock_at, out_of_stock_since, quantity,
                                           previous_quantity, quantity_warning, quantity_source,
                                           last_quantity_at, quantity_history, days_on_menu,
                                           last_updated_at, last_snapshot_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(id)
        .bind(retailer_id)
        .bind(brand_id)
        .bind(product_id)
        .bind(state.current_price)
        .bind(state.previous_price)
        .bind(state.price_changed_at)
        .bind(state.in_stock)
        .bind(state.last_in_stock_at)
        .bind(state.out_of_stock_since)
        .bind(state.quantity)
        .bind(state.previous_quantity)
        .bind(&state.quantity_warning)
        .bind(&state.quantity_source)
        .bind(state.last_quantity_at)
        .bind(serde_json::to_value(&state.quantity_history)?)
        .bind(state.days_on_menu)
        .bind(state.last_updated_at)
        .bind(snapshot_id)
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    pub async fn update_inventory(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
        state: &InventoryState,
        snapshot_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE current_inventory
            SET current_price = $2,
                previous_price = $3,
                price_changed_at = $4,
                in_stock = $5,
                last_in_stock_at = $6,
                out_of_stock_since = $7,
                quantity = $8,
                previous_quantity = $9,
                quantity_warning = $10,
                quantity_source = $11,
                last_quantity_at = $12,
                quantity_history = $13,
                days_on_menu = $14,
                last_updated_at = $15,
                last_snapshot_id = $16,
                removed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(state.current_price)
        .bind(state.previous_price)
        .bind(state.price_changed_at)
        .bind(state.in_stock)
        .bind(state.last_in_stock_at)
        .bind(state.out_of_stock_since)
        .bind(state.quantity)
        .bind(state.previous_quantity)
        .bind(&state.quantity_warning)
        .bind(&state.quantity_source)
        .bind(state.last_quantity_at)
        .bind(serde_json::to_value(&state.quantity_history)?)
        .bind(state.days_on_menu)
        .bind(state.last_updated_at)
        .bind(snapshot_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Rows for a retailer whose last update predates `cutoff` and that the
    /// sweep has not already marked, whatever their stock state. Rows touched
    /// by the current batch carry a fresh `last_updated_at`, so they never
    /// qualify.
    pub async fn stale_inventory(
        &self,
        retailer_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CurrentInventory>> {
        let rows = sqlx::query_as::<_, CurrentInventory>(
            r#"
            SELECT * FROM current_inventory
            WHERE retailer_id = $1 AND removed_at IS NULL AND last_updated_at < $2
            "#,
        )
        .bind(retailer_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stamp a row the sweep emitted for, so the next batch does not emit
    /// again. The row itself is kept untouched otherwise; a later
    /// observation clears the stamp.
    pub async fn mark_removed(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE current_inventory SET removed_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inventory events
    // -----------------------------------------------------------------------

    pub async fn insert_event(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        retailer_id: Uuid,
        product_id: Option<Uuid>,
        brand_id: Option<Uuid>,
        draft: &EventDraft,
        batch_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO inventory_events (id, retailer_id, product_id, brand_id, event_type,
                                          previous_value, new_value, metadata, batch_id,
                                          timestamp, notified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE)
            "#,
        )
        .bind(id)
        .bind(retailer_id)
        .bind(product_id)
        .bind(brand_id)
        .bind(draft.event_type.to_string())
        .bind(&draft.previous_value)
        .bind(&draft.new_value)
        .bind(&draft.metadata)
        .bind(batch_id)
        .bind(timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    /// A standalone event insert outside any item transaction (removed sweep).
    pub async fn insert_event_direct(
        &self,
        retailer_id: Uuid,
        product_id: Option<Uuid>,
        brand_id: Option<Uuid>,
        draft: &EventDraft,
        batch_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Uuid> {
        let mut tx = self.begin().await?;
        let id = self
            .insert_event(&mut tx, retailer_id, product_id, brand_id, draft, batch_id, timestamp)
            .await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn unnotified_events(&self, limit: i64) -> Result<Vec<InventoryEvent>> {
        let rows = sqlx::query_as::<_, InventoryEvent>(
            r#"
            SELECT * FROM inventory_events
            WHERE notified = FALSE
            ORDER BY timestamp ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_events_notified(&self, ids: &[Uuid], now: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE inventory_events
            SET notified = TRUE, notified_at = $2
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scrape jobs and dead letters
    // -----------------------------------------------------------------------

    pub async fn insert_scrape_job(&self, job: &NewScrapeJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scrape_jobs (id, retailer_id, source_platform, source_url, batch_id,
                                     status, started_at, completed_at, items_scraped,
                                     items_failed, error_message, retry_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job.retailer_id)
        .bind(&job.source_platform)
        .bind(&job.source_url)
        .bind(&job.batch_id)
        .bind(job.status.to_string())
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.items_scraped)
        .bind(job.items_failed)
        .bind(&job.error_message)
        .bind(job.retry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Collapse into the open entry for the same (retailer, error type) when
    /// one exists; otherwise open a new one.
    pub async fn record_dead_letter(
        &self,
        retailer_id: Uuid,
        error_type: &str,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE dead_letter_queue
            SET error_message = $3, last_attempt_at = $4, attempts = attempts + 1
            WHERE retailer_id = $1 AND error_type = $2 AND resolved_at IS NULL
            "#,
        )
        .bind(retailer_id)
        .bind(error_type)
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO dead_letter_queue (id, retailer_id, error_type, error_message,
                                               first_attempt_at, last_attempt_at, attempts)
                VALUES ($1, $2, $3, $4, $5, $5, 1)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(retailer_id)
            .bind(error_type)
            .bind(error_message)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn resolve_dead_letters(&self, retailer_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE dead_letter_queue SET resolved_at = $2 WHERE retailer_id = $1 AND resolved_at IS NULL",
        )
        .bind(retailer_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Watches
    // -----------------------------------------------------------------------

    pub async fn watches_for_product(&self, product_id: Uuid) -> Result<Vec<Watch>> {
        let rows = sqlx::query_as::<_, Watch>(
            "SELECT * FROM watches WHERE is_active = TRUE AND product_id = $1",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn touch_watch_notified(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE watches SET last_notified_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Notification queue
    // -----------------------------------------------------------------------

    pub async fn pending_queue_entry_for(
        &self,
        webhook_url: &str,
    ) -> Result<Option<NotificationQueueEntry>> {
        let row = sqlx::query_as::<_, NotificationQueueEntry>(
            "SELECT * FROM notification_queue WHERE webhook_url = $1 AND status = 'pending' LIMIT 1",
        )
        .bind(webhook_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_queue_entry(
        &self,
        entry: &NewQueueEntry,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO notification_queue (id, webhook_url, payload, event_ids,
                                            notification_type, attempt_number, status,
                                            created_at, next_retry_at, error_message)
            VALUES ($1, $2, $3, $4, $5, 1, 'pending', $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(&entry.webhook_url)
        .bind(&entry.payload)
        .bind(&entry.event_ids)
        .bind(&entry.notification_type)
        .bind(now)
        .bind(entry.next_retry_at)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Fold more events into an already-pending entry for the same webhook.
    pub async fn merge_queue_entry(
        &self,
        id: Uuid,
        payload: &Value,
        event_ids: &[Uuid],
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_queue
            SET payload = $2,
                event_ids = ARRAY(SELECT DISTINCT unnest(COALESCE(event_ids, '{}') || $3)),
                error_message = COALESCE($4, error_message)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(payload)
        .bind(event_ids)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn due_queue_entries(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationQueueEntry>> {
        let rows = sqlx::query_as::<_, NotificationQueueEntry>(
            r#"
            SELECT * FROM notification_queue
            WHERE status = 'pending' AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_queue_delivered(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_queue
            SET status = $2, delivered_at = $3, last_attempt_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(QueueStatus::Delivered.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reschedule_queue_entry(
        &self,
        id: Uuid,
        attempt_number: i32,
        next_retry_at: DateTime<Utc>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_queue
            SET attempt_number = $2, next_retry_at = $3, error_message = $4, last_attempt_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempt_number)
        .bind(next_retry_at)
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_queue_failed(
        &self,
        id: Uuid,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_queue
            SET status = $2, error_message = $3, last_attempt_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(QueueStatus::Failed.to_string())
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Health monitor queries
    // -----------------------------------------------------------------------

    pub async fn unresolved_dead_letters_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM dead_letter_queue WHERE resolved_at IS NULL AND last_attempt_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn dead_letters_of_type_since(
        &self,
        error_type: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM dead_letter_queue WHERE error_type = $1 AND last_attempt_at >= $2",
        )
        .bind(error_type)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// (total, failed) scrape jobs started since the cutoff.
    pub async fn job_counts_since(&self, since: DateTime<Utc>) -> Result<(i64, i64)> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'failed')
            FROM scrape_jobs
            WHERE started_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_alert(&self, alert: &NewAlert, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scraper_alerts (id, alert_type, severity, title, message, data,
                                        delivered_to, acknowledged, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&alert.alert_type)
        .bind(&alert.severity)
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.data)
        .bind(&alert.delivered_to)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn last_alert_at(&self, alert_type: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query_as::<_, (DateTime<Utc>,)>(
            r#"
            SELECT created_at FROM scraper_alerts
            WHERE alert_type = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(alert_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }
}
