//! Embedded-SPA extraction for stores living behind an age gate, with
//! detail-page drill-down for inventory the listing never shows and a
//! bounded cart-overflow probe as the last resort.

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use browserbase_client::{NavigateOptions, Page, PagePool, Session, WaitForSelectorOptions};
use budwatch_common::{QuantitySource, ScrapedItem, SourcePlatform};

use crate::blocked::challenge_reason;
use crate::error::{Result, ScrapeError};
use crate::extract::ajax::parse_price;

/// Prioritized card selectors; the first one that appears wins.
const CARD_SELECTORS: &[&str] = &[
    "[data-testid='product-card']",
    ".product-card",
    ".product-list-item",
    "[class*='ProductCard']",
];

const CARD_WAIT_BOUND: Duration = Duration::from_secs(15);
const DETAIL_RENDER_WAIT: Duration = Duration::from_millis(1500);
const BATCH_PAUSE: Duration = Duration::from_millis(500);

/// The overflow probe writes this into the quantity input; any corrected
/// value below it is the site clamping to real inventory.
const OVERFLOW_SENTINEL: i64 = 999;

/// Select-based quantity caps at or above this are page furniture.
const SELECT_MAX_CEILING: i64 = 50;

#[derive(Debug, Clone)]
pub struct EmbeddedConfig {
    /// Detail pages visited per location.
    pub detail_page_limit: usize,
    /// Concurrent detail pages.
    pub page_pool_size: usize,
    /// Cart-overflow probes per location.
    pub cart_probe_limit: usize,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            detail_page_limit: 40,
            page_pool_size: 4,
            cart_probe_limit: 3,
        }
    }
}

const AGE_GATE_JS: &str = r#"
(() => {
  const pattern = /^(yes|i am 21|21\+|enter|i agree)/i;
  const buttons = document.querySelectorAll('button, [role=button]');
  for (const button of buttons) {
    if (pattern.test((button.textContent || '').trim())) {
      button.click();
      return true;
    }
  }
  return false;
})()
"#;

const SCROLL_JS: &str = r#"
(async () => {
  for (let i = 0; i < 3; i++) {
    window.scrollBy(0, window.innerHeight);
    await new Promise(resolve => setTimeout(resolve, 400));
  }
  window.scrollTo(0, 0);
  return true;
})()
"#;

const DETAIL_TEXT_JS: &str =
    "document.body ? document.body.innerText.slice(0, 20000) : ''";

const SELECT_PROBE_JS: &str = r#"
(() => {
  const select = document.querySelector(
    'select[name*=quantity], select[id*=quantity], select[class*=quantity]');
  if (!select) return null;
  const values = Array.from(select.options)
    .map(o => Number(o.value))
    .filter(v => Number.isFinite(v) && v > 0);
  return values.length ? Math.max(...values) : null;
})()
"#;

const OVERFLOW_PROBE_JS: &str = r#"
(async () => {
  const input = document.querySelector('input[type=number]');
  if (!input) return null;
  const original = input.value;
  const setValue = value => {
    input.value = value;
    input.dispatchEvent(new Event('input', { bubbles: true }));
    input.dispatchEvent(new Event('change', { bubbles: true }));
  };
  setValue('999');
  await new Promise(resolve => setTimeout(resolve, 500));
  const corrected = Number(input.value);
  const text = document.body ? document.body.innerText.slice(0, 20000) : '';
  setValue(original);
  return { corrected: Number.isFinite(corrected) ? corrected : null, text };
})()
"#;

fn card_extraction_js(selector: &str) -> String {
    format!(
        r#"
(() => {{
  const cards = document.querySelectorAll({selector});
  return Array.from(cards).map(card => {{
    const text = sel => {{
      const el = card.querySelector(sel);
      return el ? el.textContent.trim() : null;
    }};
    const link = card.querySelector('a[href]');
    const img = card.querySelector('img');
    return {{
      name: text('[class*="name"], h2, h3'),
      brand: text('[class*="brand"]'),
      price: text('[class*="price"]'),
      originalPrice: text('s, del, [class*="strik"]'),
      soldOut: !!card.querySelector('[class*="soldOut"], [class*="sold-out"]'),
      warning: text('[class*="lowStock"], [class*="stock-warning"]'),
      detailUrl: link ? link.href : null,
      imageUrl: img ? img.src : null,
    }};
  }});
}})()
"#,
        selector = serde_json::to_string(selector).unwrap()
    )
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardData {
    name: Option<String>,
    brand: Option<String>,
    price: Option<String>,
    original_price: Option<String>,
    #[serde(default)]
    sold_out: bool,
    warning: Option<String>,
    detail_url: Option<String>,
    image_url: Option<String>,
}

/// An inventory reading resolved for one card, with its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InventoryReading {
    pub quantity: Option<i32>,
    pub out_of_stock: bool,
    pub source: QuantitySource,
}

pub struct EmbeddedExtractor {
    config: EmbeddedConfig,
}

impl EmbeddedExtractor {
    pub fn new(config: EmbeddedConfig) -> Self {
        Self { config }
    }

    pub async fn extract(
        &self,
        session: &Session,
        page: &Page,
        url: &str,
    ) -> Result<Vec<ScrapedItem>> {
        self.navigate_with_retries(page, url).await?;

        match page.evaluate(AGE_GATE_JS).await {
            Ok(Value::Bool(true)) => {
                debug!(url, "Age gate dismissed");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok(_) => {}
            Err(e) => debug!(url, error = %e, "Age gate check failed"),
        }

        let selector = self.wait_for_cards(page, url).await?;
        if let Err(e) = page.evaluate(SCROLL_JS).await {
            debug!(url, error = %e, "Lazy-load scroll failed");
        }

        let raw_cards = page.evaluate(&card_extraction_js(selector)).await?;
        let cards: Vec<CardData> = serde_json::from_value(raw_cards).unwrap_or_default();
        info!(url, cards = cards.len(), selector, "Listing cards extracted");

        let mut readings: Vec<InventoryReading> =
            cards.iter().map(listing_reading).collect();

        // Detail drill-down for cards whose listing revealed no inventory.
        let targets: Vec<usize> = cards
            .iter()
            .enumerate()
            .filter(|(i, card)| readings[*i].quantity.is_none() && card.detail_url.is_some())
            .map(|(i, _)| i)
            .take(self.config.detail_page_limit)
            .collect();

        if !targets.is_empty() {
            let pool_size = self.config.page_pool_size.min(targets.len());
            let pool = PagePool::create(session, pool_size).await?;

            for chunk in targets.chunks(pool.size()) {
                let visits = chunk.iter().zip(pool.pages()).map(|(&idx, detail_page)| {
                    let detail_url = cards[idx].detail_url.clone().unwrap_or_default();
                    async move { (idx, visit_detail(detail_page, &detail_url).await) }
                });
                for (idx, reading) in join_all(visits).await {
                    if let Some(reading) = reading {
                        readings[idx] = reading;
                    }
                }
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            // Cart-overflow fallback, strictly bounded per location.
            let mut probes = 0;
            for &idx in &targets {
                if probes >= self.config.cart_probe_limit {
                    break;
                }
                if readings[idx].quantity.is_some() || readings[idx].out_of_stock {
                    continue;
                }
                let detail_url = cards[idx].detail_url.clone().unwrap_or_default();
                probes += 1;
                if let Some(quantity) = cart_probe(&pool.pages()[0], &detail_url).await {
                    readings[idx] = InventoryReading {
                        quantity: Some(quantity),
                        out_of_stock: false,
                        source: QuantitySource::CartHack,
                    };
                }
            }

            pool.close().await;
        }

        let now = Utc::now();
        let items = cards
            .iter()
            .zip(&readings)
            .filter_map(|(card, reading)| card_to_item(card, reading, url, now))
            .collect::<Vec<_>>();

        info!(url, items = items.len(), "Embedded menu extracted");
        Ok(items)
    }

    /// Navigate with two retries at 2s and 4s.
    async fn navigate_with_retries(&self, page: &Page, url: &str) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match page.navigate(url, NavigateOptions::default()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt <= 2 => {
                    let delay = Duration::from_secs(2 * attempt as u64);
                    warn!(url, attempt, error = %e, delay_ms = delay.as_millis() as u64, "Navigation retry");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Find the first selector from the prioritized list to appear within the
    /// 15s bound. Failure falls through to blocked detection.
    async fn wait_for_cards(&self, page: &Page, url: &str) -> Result<&'static str> {
        let per_selector = CARD_WAIT_BOUND / CARD_SELECTORS.len() as u32;
        for &selector in CARD_SELECTORS {
            let found = page
                .wait_for_selector(
                    selector,
                    WaitForSelectorOptions {
                        timeout: per_selector,
                        visible: false,
                    },
                )
                .await;
            if found.is_ok() {
                return Ok(selector);
            }
        }

        let html = page.content().await.unwrap_or_default();
        let title = page.title().await.unwrap_or_default();
        if let Some(reason) = challenge_reason(&html, &title) {
            return Err(ScrapeError::blocked(reason));
        }
        Err(ScrapeError::new(
            budwatch_common::ErrorKind::Timeout,
            format!("no product cards appeared within {}s at {url}", CARD_WAIT_BOUND.as_secs()),
        ))
    }
}

/// What the listing card alone tells us.
fn listing_reading(card: &CardData) -> InventoryReading {
    if card.sold_out {
        return InventoryReading {
            quantity: Some(0),
            out_of_stock: true,
            source: QuantitySource::SoldOutClass,
        };
    }
    if let Some(warning) = &card.warning {
        if let Some(q) = parse_quantity_text(warning) {
            return InventoryReading {
                quantity: Some(q),
                out_of_stock: false,
                source: QuantitySource::WarningText,
            };
        }
    }
    InventoryReading {
        quantity: None,
        out_of_stock: false,
        source: QuantitySource::Inferred,
    }
}

/// Navigate one detail page, let it render, and scan its text.
async fn visit_detail(page: &Page, url: &str) -> Option<InventoryReading> {
    if url.is_empty() {
        return None;
    }
    if let Err(e) = page.navigate(url, NavigateOptions::default()).await {
        warn!(url, error = %e, "Detail page navigation failed");
        return None;
    }
    tokio::time::sleep(DETAIL_RENDER_WAIT).await;

    let text = match page.evaluate(DETAIL_TEXT_JS).await {
        Ok(value) => value.as_str().unwrap_or_default().to_string(),
        Err(e) => {
            warn!(url, error = %e, "Detail page read failed");
            return None;
        }
    };

    if is_out_of_stock_text(&text) {
        return Some(InventoryReading {
            quantity: Some(0),
            out_of_stock: true,
            source: QuantitySource::TextPattern,
        });
    }
    parse_quantity_text(&text).map(|q| InventoryReading {
        quantity: Some(q),
        out_of_stock: false,
        source: QuantitySource::TextPattern,
    })
}

/// Probe purchasable quantity on a product page: a bounded quantity select,
/// then the 999-overwrite trick. The input's original value is restored by
/// the probe script.
async fn cart_probe(page: &Page, url: &str) -> Option<i32> {
    if url.is_empty() {
        return None;
    }
    if let Err(e) = page.navigate(url, NavigateOptions::default()).await {
        warn!(url, error = %e, "Cart probe navigation failed");
        return None;
    }
    tokio::time::sleep(DETAIL_RENDER_WAIT).await;

    if let Ok(value) = page.evaluate(SELECT_PROBE_JS).await {
        if let Some(max) = value.as_i64() {
            if max > 0 && max < SELECT_MAX_CEILING {
                return Some(max as i32);
            }
        }
    }

    match page.evaluate(OVERFLOW_PROBE_JS).await {
        Ok(result) => {
            let corrected = result.get("corrected").and_then(Value::as_i64);
            let text = result.get("text").and_then(Value::as_str).unwrap_or("");
            parse_cart_limit(text, corrected)
        }
        Err(e) => {
            warn!(url, error = %e, "Cart overflow probe failed");
            None
        }
    }
}

// --- Text parsing ---

static QUANTITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)hurry,?\s+only\s+(\d+)",
        r"(?i)only\s+(\d+)\s+left",
        r"(?i)limited:\s*(\d+)",
        r"(?i)low\s+stock:\s*(\d+)",
        r"(?i)(\d+)\s+left\b",
        r"(?i)(\d+)\s+remaining",
        r"(?i)(\d+)\s+available",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const OUT_OF_STOCK_PHRASES: &[&str] = &["out of stock", "sold out", "unavailable", "not available"];

/// First quantity pattern to match wins; more specific phrasings first.
pub fn parse_quantity_text(text: &str) -> Option<i32> {
    for pattern in QUANTITY_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(q) = caps[1].parse() {
                return Some(q);
            }
        }
    }
    None
}

pub fn is_out_of_stock_text(text: &str) -> bool {
    let folded = text.to_lowercase();
    OUT_OF_STOCK_PHRASES.iter().any(|p| folded.contains(p))
}

static CART_LIMIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)max(?:imum)?\s+(?:of\s+)?(\d+)",
        r"(?i)limit(?:ed)?\s+(?:to\s+)?(\d+)",
        r"(?i)only\s+(\d+)\s+(?:available|remaining|left)",
        r"(?i)cannot\s+add\s+more\s+than\s+(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Read the site's reaction to the overflow write: an explicit limit message,
/// or the input clamped below the sentinel.
pub fn parse_cart_limit(text: &str, corrected: Option<i64>) -> Option<i32> {
    for pattern in CART_LIMIT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(q) = caps[1].parse::<i32>() {
                if q > 0 {
                    return Some(q);
                }
            }
        }
    }
    corrected
        .filter(|c| *c > 0 && *c < OVERFLOW_SENTINEL)
        .map(|c| c as i32)
}

fn card_to_item(
    card: &CardData,
    reading: &InventoryReading,
    url: &str,
    now: chrono::DateTime<Utc>,
) -> Option<ScrapedItem> {
    let name = card.name.as_deref()?.trim();
    if name.is_empty() {
        return None;
    }
    let price = parse_price(card.price.as_deref()?)?;

    Some(ScrapedItem {
        raw_product_name: name.to_string(),
        raw_brand_name: card.brand.clone().unwrap_or_default().trim().to_string(),
        raw_category: None,
        price,
        original_price: card.original_price.as_deref().and_then(parse_price),
        in_stock: !reading.out_of_stock,
        quantity: reading.quantity,
        quantity_warning: card.warning.clone().filter(|w| !w.is_empty()),
        quantity_source: reading.source,
        thc_formatted: None,
        cbd_formatted: None,
        image_url: card.image_url.clone(),
        source_url: url.to_string(),
        source_platform: SourcePlatform::DutchieEmbedded,
        scraped_at: now,
        product_url: card.detail_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_patterns_cover_known_phrasings() {
        assert_eq!(parse_quantity_text("Hurry, only 2 left in stock"), Some(2));
        assert_eq!(parse_quantity_text("Only 4 left!"), Some(4));
        assert_eq!(parse_quantity_text("Limited: 6"), Some(6));
        assert_eq!(parse_quantity_text("low stock: 3"), Some(3));
        assert_eq!(parse_quantity_text("12 remaining"), Some(12));
        assert_eq!(parse_quantity_text("8 available today"), Some(8));
        assert_eq!(parse_quantity_text("3 left"), Some(3));
        assert_eq!(parse_quantity_text("plenty in stock"), None);
    }

    #[test]
    fn out_of_stock_phrases_are_case_insensitive() {
        assert!(is_out_of_stock_text("This item is SOLD OUT"));
        assert!(is_out_of_stock_text("Currently unavailable"));
        assert!(!is_out_of_stock_text("Available now"));
    }

    #[test]
    fn cart_limit_prefers_explicit_messages() {
        assert_eq!(parse_cart_limit("Maximum of 5 per order", Some(999)), Some(5));
        assert_eq!(parse_cart_limit("limit to 3", None), Some(3));
        assert_eq!(parse_cart_limit("only 7 available", None), Some(7));
        assert_eq!(parse_cart_limit("cannot add more than 2", None), Some(2));
    }

    #[test]
    fn cart_limit_falls_back_to_corrected_value() {
        assert_eq!(parse_cart_limit("added to cart", Some(12)), Some(12));
        // The sentinel surviving untouched means the site accepted 999 —
        // that is not an inventory reading.
        assert_eq!(parse_cart_limit("added to cart", Some(999)), None);
        assert_eq!(parse_cart_limit("added to cart", None), None);
    }

    #[test]
    fn sold_out_listing_cards_need_no_drilldown() {
        let card = CardData {
            name: Some("Gone".into()),
            brand: None,
            price: Some("$10".into()),
            original_price: None,
            sold_out: true,
            warning: None,
            detail_url: Some("https://example.com/p/gone".into()),
            image_url: None,
        };
        let reading = listing_reading(&card);
        assert_eq!(reading.quantity, Some(0));
        assert!(reading.out_of_stock);
        assert_eq!(reading.source, QuantitySource::SoldOutClass);
    }

    #[test]
    fn warning_with_count_resolves_on_the_listing() {
        let card = CardData {
            name: Some("Popular".into()),
            brand: None,
            price: Some("$10".into()),
            original_price: None,
            sold_out: false,
            warning: Some("Only 2 left!".into()),
            detail_url: None,
            image_url: None,
        };
        let reading = listing_reading(&card);
        assert_eq!(reading.quantity, Some(2));
        assert_eq!(reading.source, QuantitySource::WarningText);
    }
}
