use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Menu platforms ---

/// Menu platform a location is served by. Detection lives in the scraper;
/// this is the stable identifier carried on snapshots and scrape jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourcePlatform {
    /// Server-rendered hydration payload; scraped without a browser.
    #[serde(rename = "dutchie")]
    Dutchie,
    /// Placeholder HTML hydrated via XHR; needs a browser.
    #[serde(rename = "leafbridge")]
    Leafbridge,
    /// Store embedded behind an age gate; needs a browser plus
    /// detail-page drill-down for inventory.
    #[serde(rename = "dutchie-embedded")]
    DutchieEmbedded,
}

impl std::fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourcePlatform::Dutchie => write!(f, "dutchie"),
            SourcePlatform::Leafbridge => write!(f, "leafbridge"),
            SourcePlatform::DutchieEmbedded => write!(f, "dutchie-embedded"),
        }
    }
}

impl std::str::FromStr for SourcePlatform {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dutchie" => Ok(Self::Dutchie),
            "leafbridge" => Ok(Self::Leafbridge),
            "dutchie-embedded" => Ok(Self::DutchieEmbedded),
            other => Err(format!("unknown SourcePlatform: {other}")),
        }
    }
}

// --- Quantity provenance ---

/// How an item's quantity reading was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantitySource {
    Ssr,
    LeafbridgeInputMax,
    TextPattern,
    SoldOutClass,
    CartHack,
    WarningText,
    Inferred,
}

impl std::fmt::Display for QuantitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantitySource::Ssr => write!(f, "ssr"),
            QuantitySource::LeafbridgeInputMax => write!(f, "leafbridge_input_max"),
            QuantitySource::TextPattern => write!(f, "text_pattern"),
            QuantitySource::SoldOutClass => write!(f, "sold_out_class"),
            QuantitySource::CartHack => write!(f, "cart_hack"),
            QuantitySource::WarningText => write!(f, "warning_text"),
            QuantitySource::Inferred => write!(f, "inferred"),
        }
    }
}

impl std::str::FromStr for QuantitySource {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ssr" => Ok(Self::Ssr),
            "leafbridge_input_max" => Ok(Self::LeafbridgeInputMax),
            "text_pattern" => Ok(Self::TextPattern),
            "sold_out_class" => Ok(Self::SoldOutClass),
            "cart_hack" => Ok(Self::CartHack),
            "warning_text" => Ok(Self::WarningText),
            "inferred" => Ok(Self::Inferred),
            other => Err(format!("unknown QuantitySource: {other}")),
        }
    }
}

// --- Inventory events ---

/// Per-product state transition detected between snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewProduct,
    Restock,
    SoldOut,
    PriceDrop,
    PriceIncrease,
    Removed,
    LowStock,
    QuantityChange,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::NewProduct => write!(f, "new_product"),
            EventType::Restock => write!(f, "restock"),
            EventType::SoldOut => write!(f, "sold_out"),
            EventType::PriceDrop => write!(f, "price_drop"),
            EventType::PriceIncrease => write!(f, "price_increase"),
            EventType::Removed => write!(f, "removed"),
            EventType::LowStock => write!(f, "low_stock"),
            EventType::QuantityChange => write!(f, "quantity_change"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new_product" => Ok(Self::NewProduct),
            "restock" => Ok(Self::Restock),
            "sold_out" => Ok(Self::SoldOut),
            "price_drop" => Ok(Self::PriceDrop),
            "price_increase" => Ok(Self::PriceIncrease),
            "removed" => Ok(Self::Removed),
            "low_stock" => Ok(Self::LowStock),
            "quantity_change" => Ok(Self::QuantityChange),
            other => Err(format!("unknown EventType: {other}")),
        }
    }
}

// --- Weights ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    G,
    Mg,
    Pack,
    Piece,
}

impl std::fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightUnit::G => write!(f, "g"),
            WeightUnit::Mg => write!(f, "mg"),
            WeightUnit::Pack => write!(f, "pack"),
            WeightUnit::Piece => write!(f, "piece"),
        }
    }
}

// --- Scrape wire types ---

/// One product as read off a menu page. Produced by the extractors, consumed
/// by ingestion. Serialized camelCase on the ingest wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedItem {
    pub raw_product_name: String,
    pub raw_brand_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_category: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    pub in_stock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_warning: Option<String>,
    pub quantity_source: QuantitySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thc_formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbd_formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub source_url: String,
    pub source_platform: SourcePlatform,
    pub scraped_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Ok,
    Error,
}

/// Result of scraping one menu location within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResult {
    pub retailer_id: Uuid,
    pub status: LocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub items: Vec<ScrapedItem>,
}

/// One atomic delivery of scraped results to the ingestion engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeBatch {
    pub batch_id: String,
    pub results: Vec<LocationResult>,
}

// --- Location configuration ---

/// A curated menu location. Seeded from the locations file; disabled
/// locations are skipped by the orchestrator but still listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuLocation {
    pub retailer_id: Uuid,
    pub retailer_name: String,
    pub url: String,
    /// Platform override. When absent, detection runs on URL and HTML.
    #[serde(default)]
    pub platform: Option<SourcePlatform>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub disabled_reason: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn platform_serde_names_match_display() {
        let json = serde_json::to_string(&SourcePlatform::DutchieEmbedded).unwrap();
        assert_eq!(json, "\"dutchie-embedded\"");
        assert_eq!(
            SourcePlatform::from_str("dutchie-embedded").unwrap(),
            SourcePlatform::DutchieEmbedded
        );
    }

    #[test]
    fn quantity_source_serde_is_snake_case() {
        let json = serde_json::to_string(&QuantitySource::LeafbridgeInputMax).unwrap();
        assert_eq!(json, "\"leafbridge_input_max\"");
    }

    #[test]
    fn scraped_item_wire_shape_is_camel_case() {
        let item = ScrapedItem {
            raw_product_name: "Blue Dream".into(),
            raw_brand_name: "Grocery".into(),
            raw_category: None,
            price: 45.0,
            original_price: None,
            in_stock: true,
            quantity: Some(3),
            quantity_warning: None,
            quantity_source: QuantitySource::Ssr,
            thc_formatted: None,
            cbd_formatted: None,
            image_url: None,
            source_url: "https://example.com/menu".into(),
            source_platform: SourcePlatform::Dutchie,
            scraped_at: Utc::now(),
            product_url: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("rawProductName").is_some());
        assert!(json.get("sourcePlatform").is_some());
        assert!(json.get("raw_product_name").is_none());
    }

    #[test]
    fn menu_location_defaults_to_active() {
        let loc: MenuLocation = serde_json::from_str(
            r#"{"retailer_id":"7f1aeb5c-53fb-4dcf-a2e4-02b29a44a2f3",
                "retailer_name":"Green Door",
                "url":"https://dutchie.com/stores/green-door"}"#,
        )
        .unwrap();
        assert!(loc.active);
        assert!(loc.platform.is_none());
        assert!(loc.disabled_reason.is_none());
    }
}
