//! AJAX-DOM extraction for platforms that serve placeholder HTML and hydrate
//! the menu over XHR. Needs a browser page; the card selector gets a fixed
//! 5s bound to appear after navigation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use browserbase_client::{NavigateOptions, Page, WaitForSelectorOptions};
use budwatch_common::{QuantitySource, ScrapedItem, SourcePlatform};

use crate::blocked::challenge_reason;
use crate::error::{Result, ScrapeError};

const CARD_SELECTOR: &str = ".lb-product-card, .product-card";

const HYDRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Number inputs capped above this are page-size limits, not inventory.
const INPUT_MAX_CEILING: i64 = 100;

/// In-page card reader. Returns one object per card; prices stay as display
/// text and are parsed host-side.
const CARD_EXTRACTION_JS: &str = r#"
(() => {
  const cards = document.querySelectorAll('.lb-product-card, .product-card');
  return Array.from(cards).map(card => {
    const text = sel => {
      const el = card.querySelector(sel);
      return el ? el.textContent.trim() : null;
    };
    const input = card.querySelector('input[type=number]');
    return {
      name: text('.product-name, [class*="productName"], h3'),
      brand: text('.brand-name, [class*="brandName"]'),
      price: text('.price, [class*="price"]'),
      originalPrice: text('.original-price, s, del'),
      soldOut: card.className.includes('sold-out')
        || !!card.querySelector('.sold-out, [class*="soldOut"]'),
      warning: text('.stock-warning, [class*="lowStock"]'),
      inputMax: input && input.max !== '' ? Number(input.max) : null,
    };
  });
})()
"#;

pub struct AjaxExtractor;

impl AjaxExtractor {
    pub fn new() -> Self {
        Self
    }

    pub async fn extract(&self, page: &Page, url: &str) -> Result<Vec<ScrapedItem>> {
        page.navigate(url, NavigateOptions::default()).await?;

        let html = page.content().await?;
        let title = page.title().await?;
        if let Some(reason) = challenge_reason(&html, &title) {
            return Err(ScrapeError::blocked(reason));
        }

        page.wait_for_selector(
            CARD_SELECTOR,
            WaitForSelectorOptions {
                timeout: HYDRATION_TIMEOUT,
                visible: false,
            },
        )
        .await?;

        let cards = page.evaluate(CARD_EXTRACTION_JS).await?;
        let now = Utc::now();
        let items: Vec<ScrapedItem> = cards
            .as_array()
            .map(|cards| {
                cards
                    .iter()
                    .filter_map(|card| card_to_item(card, url, now))
                    .collect()
            })
            .unwrap_or_default();

        info!(url, items = items.len(), "AJAX menu extracted");
        Ok(items)
    }
}

impl Default for AjaxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Map one in-page card object to a ScrapedItem. Cards without a name or a
/// parseable price are dropped.
pub fn card_to_item(card: &Value, url: &str, now: DateTime<Utc>) -> Option<ScrapedItem> {
    let name = card.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }
    let price = parse_price(card.get("price").and_then(Value::as_str)?)?;
    let original_price = card
        .get("originalPrice")
        .and_then(Value::as_str)
        .and_then(parse_price);

    let sold_out = card.get("soldOut").and_then(Value::as_bool).unwrap_or(false);
    let warning = card
        .get("warning")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|w| !w.is_empty());

    // input[type=number].max is an inventory proxy when it looks like a real
    // per-product cap rather than a generic page limit.
    let input_max = card
        .get("inputMax")
        .and_then(Value::as_i64)
        .filter(|max| *max > 0 && *max <= INPUT_MAX_CEILING);

    let (quantity, quantity_source) = if sold_out {
        (Some(0), QuantitySource::SoldOutClass)
    } else if let Some(max) = input_max {
        (Some(max as i32), QuantitySource::LeafbridgeInputMax)
    } else if warning.is_some() {
        (None, QuantitySource::WarningText)
    } else {
        (None, QuantitySource::Inferred)
    };

    Some(ScrapedItem {
        raw_product_name: name.to_string(),
        raw_brand_name: card
            .get("brand")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string(),
        raw_category: None,
        price,
        original_price,
        in_stock: !sold_out,
        quantity,
        quantity_warning: warning,
        quantity_source,
        thc_formatted: None,
        cbd_formatted: None,
        image_url: None,
        source_url: url.to_string(),
        source_platform: SourcePlatform::Leafbridge,
        scraped_at: now,
        product_url: None,
    })
}

/// Parse a display price ("$45", "$1,234.50") into dollars.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    (value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_price_handles_symbols_and_commas() {
        assert_eq!(parse_price("$45.00"), Some(45.0));
        assert_eq!(parse_price("$1,234.50"), Some(1234.5));
        assert_eq!(parse_price("Sold Out"), None);
    }

    #[test]
    fn input_max_becomes_inventory_when_plausible() {
        let card = json!({
            "name": "Blue Dream", "brand": "Cloud Co", "price": "$45.00",
            "soldOut": false, "inputMax": 12
        });
        let item = card_to_item(&card, "u", Utc::now()).unwrap();
        assert_eq!(item.quantity, Some(12));
        assert_eq!(item.quantity_source, QuantitySource::LeafbridgeInputMax);
        assert!(item.in_stock);
    }

    #[test]
    fn oversized_input_max_is_ignored() {
        let card = json!({
            "name": "Blue Dream", "price": "$45.00", "inputMax": 999
        });
        let item = card_to_item(&card, "u", Utc::now()).unwrap();
        assert_eq!(item.quantity, None);
        assert_eq!(item.quantity_source, QuantitySource::Inferred);
    }

    #[test]
    fn sold_out_cards_read_zero_quantity() {
        let card = json!({
            "name": "Gone Product", "price": "$30.00", "soldOut": true
        });
        let item = card_to_item(&card, "u", Utc::now()).unwrap();
        assert!(!item.in_stock);
        assert_eq!(item.quantity, Some(0));
        assert_eq!(item.quantity_source, QuantitySource::SoldOutClass);
    }

    #[test]
    fn low_stock_warning_is_carried_without_quantity() {
        let card = json!({
            "name": "Popular Item", "price": "$25.00", "warning": "Only 2 left!"
        });
        let item = card_to_item(&card, "u", Utc::now()).unwrap();
        assert_eq!(item.quantity, None);
        assert_eq!(item.quantity_warning.as_deref(), Some("Only 2 left!"));
        assert_eq!(item.quantity_source, QuantitySource::WarningText);
    }

    #[test]
    fn nameless_or_priceless_cards_are_dropped() {
        assert!(card_to_item(&json!({ "price": "$10" }), "u", Utc::now()).is_none());
        assert!(card_to_item(&json!({ "name": "X" }), "u", Utc::now()).is_none());
    }
}
