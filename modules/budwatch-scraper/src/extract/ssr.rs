//! SSR-JSON extraction for storefronts that embed the full menu in a
//! hydration payload. One HTML fetch, no browser.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use budwatch_common::{ErrorKind, QuantitySource, ScrapedItem, SourcePlatform};

use crate::blocked::challenge_reason;
use crate::error::{Result, ScrapeError};

/// Element id carrying the hydration payload.
const PAYLOAD_ELEMENT_ID: &str = "__NEXT_DATA__";

/// Collections inside the menu payload worth walking, in order.
const COLLECTION_PATHS: &[&[&str]] = &[
    &["props", "pageProps", "menuData", "showcasedGroups"],
    &["props", "pageProps", "menuData", "deals"],
    &["props", "pageProps", "menuData", "searchResults"],
];

static PAYLOAD_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).unwrap()
});

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").unwrap());

pub struct SsrExtractor {
    http: reqwest::Client,
}

impl Default for SsrExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SsrExtractor {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self { http }
    }

    pub async fn extract(&self, url: &str) -> Result<Vec<ScrapedItem>> {
        let resp = self
            .http
            .get(url)
            .header("User-Agent", "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .send()
            .await
            .map_err(|e| ScrapeError::new(ErrorKind::NavigationFailed, e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ScrapeError::new(ErrorKind::RateLimit, format!("HTTP 429 from {url}")));
        }
        if !status.is_success() {
            return Err(ScrapeError::new(
                ErrorKind::NavigationFailed,
                format!("HTTP {status} from {url}"),
            ));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| ScrapeError::new(ErrorKind::NavigationFailed, e.to_string()))?;

        let items = parse_menu_html(&html, url, Utc::now())?;
        info!(url, items = items.len(), "SSR menu extracted");
        Ok(items)
    }
}

/// Locate the hydration payload in the HTML and map its product records.
pub fn parse_menu_html(html: &str, url: &str, now: DateTime<Utc>) -> Result<Vec<ScrapedItem>> {
    let title = TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    if let Some(reason) = challenge_reason(html, title) {
        return Err(ScrapeError::blocked(reason));
    }

    let payload_text = PAYLOAD_SCRIPT
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            ScrapeError::parse_failed(format!("no #{PAYLOAD_ELEMENT_ID} payload in {url}"))
        })?;

    let payload: Value = serde_json::from_str(payload_text)
        .map_err(|e| ScrapeError::parse_failed(format!("payload is not JSON: {e}")))?;

    let mut items = Vec::new();
    for path in COLLECTION_PATHS {
        let Some(collection) = walk(&payload, path).and_then(Value::as_array) else {
            continue;
        };
        for entry in collection {
            // Showcased groups nest their products one level down; deals and
            // search results are flat records.
            if let Some(products) = entry.get("products").and_then(Value::as_array) {
                for record in products {
                    if let Some(item) = map_record(record, url, now) {
                        items.push(item);
                    }
                }
            } else if let Some(item) = map_record(entry, url, now) {
                items.push(item);
            }
        }
    }

    if items.is_empty() {
        debug!(url, "SSR payload present but no products found");
    }
    Ok(items)
}

fn walk<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    Some(cursor)
}

/// Map one raw product record to a ScrapedItem. Records missing a name or a
/// price are dropped.
fn map_record(record: &Value, url: &str, now: DateTime<Utc>) -> Option<ScrapedItem> {
    let name = record.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }

    let brand = record
        .get("brand")
        .and_then(|b| b.get("name"))
        .and_then(Value::as_str)
        .or_else(|| record.get("brandName").and_then(Value::as_str))
        .unwrap_or("")
        .trim();

    let price_cents = record
        .get("priceInCents")
        .and_then(Value::as_i64)
        .or_else(|| record.get("posPriceInCents").and_then(Value::as_i64))?;
    let original_cents = record.get("originalPriceInCents").and_then(Value::as_i64);

    // Inventory comes from a dedicated numeric field on this platform.
    let quantity = record
        .get("quantityAvailable")
        .and_then(Value::as_i64)
        .map(|q| q as i32);
    let sold_out = record
        .get("soldOut")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let in_stock = !sold_out && quantity.map(|q| q > 0).unwrap_or(true);

    let product_url = record
        .get("slug")
        .and_then(Value::as_str)
        .map(|slug| format!("{}/product/{}", url.trim_end_matches('/'), slug));

    Some(ScrapedItem {
        raw_product_name: name.to_string(),
        raw_brand_name: brand.to_string(),
        raw_category: record
            .get("category")
            .and_then(Value::as_str)
            .map(str::to_string),
        price: price_cents as f64 / 100.0,
        original_price: original_cents.map(|c| c as f64 / 100.0),
        in_stock,
        quantity,
        quantity_warning: None,
        quantity_source: QuantitySource::Ssr,
        thc_formatted: record
            .get("thcFormatted")
            .and_then(Value::as_str)
            .map(str::to_string),
        cbd_formatted: record
            .get("cbdFormatted")
            .and_then(Value::as_str)
            .map(str::to_string),
        image_url: record.get("image").and_then(Value::as_str).map(str::to_string),
        source_url: url.to_string(),
        source_platform: SourcePlatform::Dutchie,
        scraped_at: now,
        product_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu_html(menu_data: Value) -> String {
        let payload = serde_json::json!({
            "props": { "pageProps": { "menuData": menu_data } }
        });
        format!(
            r#"<html><head><title>Menu</title></head><body>
            <script id="__NEXT_DATA__" type="application/json">{payload}</script>
            </body></html>"#
        )
    }

    #[test]
    fn showcased_groups_and_deals_are_walked() {
        let html = menu_html(serde_json::json!({
            "showcasedGroups": [
                { "name": "Staff Picks", "products": [
                    { "name": "Black Diesel", "brand": { "name": "Grocery" },
                      "category": "Flower", "priceInCents": 18000,
                      "quantityAvailable": 3, "thcFormatted": "29.21%" }
                ] }
            ],
            "deals": [
                { "name": "Blue Dream", "brandName": "Cloud Co",
                  "priceInCents": 4500, "originalPriceInCents": 6000,
                  "quantityAvailable": 0, "soldOut": true }
            ]
        }));

        let items = parse_menu_html(&html, "https://dutchie.com/stores/green-door", Utc::now()).unwrap();
        assert_eq!(items.len(), 2);

        let diesel = &items[0];
        assert_eq!(diesel.raw_product_name, "Black Diesel");
        assert_eq!(diesel.raw_brand_name, "Grocery");
        assert_eq!(diesel.price, 180.0);
        assert_eq!(diesel.quantity, Some(3));
        assert!(diesel.in_stock);
        assert_eq!(diesel.quantity_source, QuantitySource::Ssr);

        let dream = &items[1];
        assert_eq!(dream.price, 45.0);
        assert_eq!(dream.original_price, Some(60.0));
        assert!(!dream.in_stock);
    }

    #[test]
    fn missing_payload_is_a_parse_failure() {
        let err = parse_menu_html("<html><body>hello</body></html>", "u", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseFailed);
    }

    #[test]
    fn challenge_pages_fail_as_blocked() {
        let html = r#"<html><head><title>Just a moment...</title></head></html>"#;
        let err = parse_menu_html(html, "u", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Blocked);
    }

    #[test]
    fn records_without_price_are_dropped() {
        let html = menu_html(serde_json::json!({
            "searchResults": [ { "name": "No Price Listed" } ]
        }));
        let items = parse_menu_html(&html, "u", Utc::now()).unwrap();
        assert!(items.is_empty());
    }
}
