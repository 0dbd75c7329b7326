//! Row types for the catalog store. Enums and JSONB payloads are decoded in
//! the FromRow impls so the rest of the crate works with typed values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use budwatch_common::{EventType, QuantitySource};

/// Bounded ring of recent quantity readings, newest first.
pub const QUANTITY_HISTORY_LIMIT: usize = 10;

/// Quantities strictly below this (and above zero) count as low stock.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

// --- Retailers ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuSource {
    pub url: String,
    pub platform: String,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Retailer {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub license_number: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub region: Option<String>,
    pub is_active: bool,
    pub menu_sources: Vec<MenuSource>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for Retailer {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let menu_sources: Value = row.try_get("menu_sources")?;
        Ok(Retailer {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            license_number: row.try_get("license_number")?,
            street: row.try_get("street")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip: row.try_get("zip")?,
            lat: row.try_get("lat")?,
            lng: row.try_get("lng")?,
            region: row.try_get("region")?,
            is_active: row.try_get("is_active")?,
            menu_sources: serde_json::from_value(menu_sources).unwrap_or_default(),
        })
    }
}

// --- Catalog ---

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub aliases: Vec<String>,
    pub category: Option<String>,
    pub is_verified: bool,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub strain: Option<String>,
    pub weight_amount: Option<f64>,
    pub weight_unit: Option<String>,
    pub thc_min: Option<f64>,
    pub thc_max: Option<f64>,
    pub cbd_min: Option<f64>,
    pub cbd_max: Option<f64>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

// --- Snapshots ---

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub retailer_id: Uuid,
    pub product_id: Uuid,
    pub scraped_at: DateTime<Utc>,
    pub batch_id: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub is_on_sale: bool,
    pub discount_percent: Option<i32>,
    pub in_stock: bool,
    pub quantity: Option<i32>,
    pub quantity_warning: Option<String>,
    pub quantity_source: QuantitySource,
    pub source_url: String,
    pub source_platform: String,
    pub raw_product_name: String,
    pub raw_brand_name: String,
    pub raw_category: Option<String>,
}

// --- Current inventory ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityReading {
    pub quantity: i32,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct CurrentInventory {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub brand_id: Uuid,
    pub product_id: Uuid,
    pub current_price: f64,
    pub previous_price: Option<f64>,
    pub price_changed_at: Option<DateTime<Utc>>,
    pub in_stock: bool,
    pub last_in_stock_at: Option<DateTime<Utc>>,
    pub out_of_stock_since: Option<DateTime<Utc>>,
    pub quantity: Option<i32>,
    pub previous_quantity: Option<i32>,
    pub quantity_warning: Option<String>,
    pub quantity_source: Option<String>,
    pub last_quantity_at: Option<DateTime<Utc>>,
    pub quantity_history: Vec<QuantityReading>,
    pub days_on_menu: i32,
    pub last_updated_at: DateTime<Utc>,
    pub last_snapshot_id: Option<Uuid>,
    /// Set by the removed sweep; cleared when the product is observed again.
    pub removed_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CurrentInventory {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let history: Value = row.try_get("quantity_history")?;
        Ok(CurrentInventory {
            id: row.try_get("id")?,
            retailer_id: row.try_get("retailer_id")?,
            brand_id: row.try_get("brand_id")?,
            product_id: row.try_get("product_id")?,
            current_price: row.try_get("current_price")?,
            previous_price: row.try_get("previous_price")?,
            price_changed_at: row.try_get("price_changed_at")?,
            in_stock: row.try_get("in_stock")?,
            last_in_stock_at: row.try_get("last_in_stock_at")?,
            out_of_stock_since: row.try_get("out_of_stock_since")?,
            quantity: row.try_get("quantity")?,
            previous_quantity: row.try_get("previous_quantity")?,
            quantity_warning: row.try_get("quantity_warning")?,
            quantity_source: row.try_get("quantity_source")?,
            last_quantity_at: row.try_get("last_quantity_at")?,
            quantity_history: serde_json::from_value(history).unwrap_or_default(),
            days_on_menu: row.try_get("days_on_menu")?,
            last_updated_at: row.try_get("last_updated_at")?,
            last_snapshot_id: row.try_get("last_snapshot_id")?,
            removed_at: row.try_get("removed_at")?,
        })
    }
}

// --- Events ---

#[derive(Debug, Clone)]
pub struct InventoryEvent {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub product_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub event_type: EventType,
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    pub metadata: Option<Value>,
    pub batch_id: String,
    pub timestamp: DateTime<Utc>,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for InventoryEvent {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let event_type: String = row.try_get("event_type")?;
        Ok(InventoryEvent {
            id: row.try_get("id")?,
            retailer_id: row.try_get("retailer_id")?,
            product_id: row.try_get("product_id")?,
            brand_id: row.try_get("brand_id")?,
            event_type: event_type
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            previous_value: row.try_get("previous_value")?,
            new_value: row.try_get("new_value")?,
            metadata: row.try_get("metadata")?,
            batch_id: row.try_get("batch_id")?,
            timestamp: row.try_get("timestamp")?,
            notified: row.try_get("notified")?,
            notified_at: row.try_get("notified_at")?,
        })
    }
}

// --- Scrape jobs and dead letters ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeJob {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub source_platform: String,
    pub source_url: String,
    pub batch_id: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_scraped: i32,
    pub items_failed: i32,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub error_type: String,
    pub error_message: String,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub attempts: i32,
    pub resolved_at: Option<DateTime<Utc>>,
}

// --- Notification queue ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Delivered,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Delivered => write!(f, "delivered"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationQueueEntry {
    pub id: Uuid,
    pub webhook_url: String,
    pub payload: Value,
    pub event_ids: Option<Vec<Uuid>>,
    pub notification_type: String,
    pub attempt_number: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

// --- Operator alerts ---

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScraperAlert {
    pub id: Uuid,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub data: Option<Value>,
    pub delivered_to: Vec<String>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// --- Watches ---

/// A subscriber's standing interest in a product. Owned by the consumer
/// product; the dispatcher only reads these.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Watch {
    pub id: Uuid,
    pub email: String,
    pub product_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub retailer_ids: Option<Vec<Uuid>>,
    pub alert_types: Vec<String>,
    pub webhook_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_notified_at: Option<DateTime<Utc>>,
}
