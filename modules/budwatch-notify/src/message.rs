//! Consumer alert formatting: one Discord-style embed per (event, watcher).

use chrono::Utc;
use serde_json::{json, Value};

use budwatch_common::EventType;
use budwatch_ingest::models::InventoryEvent;

const COLOR_GREEN: u32 = 0x57F287;
const COLOR_BLUE: u32 = 0x3498DB;

/// Everything the embed needs beyond the event row itself.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub product_name: String,
    pub brand_name: String,
    pub retailer_name: String,
    pub retailer_city: Option<String>,
    pub retailer_state: Option<String>,
    pub watcher_email: String,
}

/// Alert types a watcher can subscribe to, as stored on the watch row.
/// `new_product` events surface under the `new_drop` code.
pub fn watcher_code(event_type: EventType) -> Option<&'static str> {
    match event_type {
        EventType::Restock => Some("restock"),
        EventType::PriceDrop => Some("price_drop"),
        EventType::NewProduct => Some("new_drop"),
        _ => None,
    }
}

fn price_of(value: &Option<Value>) -> Option<f64> {
    value.as_ref()?.get("price")?.as_f64()
}

fn location_line(ctx: &MessageContext) -> String {
    match (&ctx.retailer_city, &ctx.retailer_state) {
        (Some(city), Some(state)) => format!("📍 @ {} ({city}, {state})", ctx.retailer_name),
        _ => format!("📍 @ {}", ctx.retailer_name),
    }
}

/// Build the embed for an alertable event, or None for types that never
/// reach watchers.
pub fn build_event_embed(event: &InventoryEvent, ctx: &MessageContext) -> Option<Value> {
    let (title, color, body) = match event.event_type {
        EventType::Restock => {
            let price = price_of(&event.new_value).unwrap_or_default();
            (
                "🔔 Back in stock",
                COLOR_GREEN,
                format!(
                    "**{} - {}** is back in stock!\n💵 ${price:.2}",
                    ctx.brand_name, ctx.product_name
                ),
            )
        }
        EventType::PriceDrop => {
            let prev = price_of(&event.previous_value).unwrap_or_default();
            let curr = price_of(&event.new_value).unwrap_or_default();
            let percent = event
                .metadata
                .as_ref()
                .and_then(|m| m.get("changePercent"))
                .and_then(Value::as_f64)
                .map(|p| p.abs())
                .unwrap_or_default();
            (
                "📉 Price drop",
                COLOR_GREEN,
                format!(
                    "**{} - {}** price dropped!\n💵 ${prev:.2} → ${curr:.2} ({percent}% off)",
                    ctx.brand_name, ctx.product_name
                ),
            )
        }
        EventType::NewProduct => {
            let price = price_of(&event.new_value).unwrap_or_default();
            (
                "🆕 New drop",
                COLOR_BLUE,
                format!(
                    "{} just dropped **{}**!\n💵 ${price:.2}",
                    ctx.brand_name, ctx.product_name
                ),
            )
        }
        _ => return None,
    };

    Some(json!({
        "embeds": [{
            "title": title,
            "description": format!("{body}\n{}", location_line(ctx)),
            "color": color,
            "footer": { "text": format!("Watching: {}", ctx.watcher_email) },
            "timestamp": Utc::now().to_rfc3339(),
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(event_type: EventType, prev: Option<Value>, new: Option<Value>, meta: Option<Value>) -> InventoryEvent {
        InventoryEvent {
            id: Uuid::new_v4(),
            retailer_id: Uuid::new_v4(),
            product_id: Some(Uuid::new_v4()),
            brand_id: Some(Uuid::new_v4()),
            event_type,
            previous_value: prev,
            new_value: new,
            metadata: meta,
            batch_id: "b1".into(),
            timestamp: Utc::now(),
            notified: false,
            notified_at: None,
        }
    }

    fn ctx() -> MessageContext {
        MessageContext {
            product_name: "Black Diesel".into(),
            brand_name: "Grocery".into(),
            retailer_name: "Green Door".into(),
            retailer_city: Some("Portland".into()),
            retailer_state: Some("OR".into()),
            watcher_email: "fan@example.com".into(),
        }
    }

    #[test]
    fn restock_embed_reads_price_and_location() {
        let e = event(EventType::Restock, None, Some(json!({ "price": 45.0 })), None);
        let embed = build_event_embed(&e, &ctx()).unwrap();
        let description = embed["embeds"][0]["description"].as_str().unwrap();
        assert!(description.contains("**Grocery - Black Diesel** is back in stock!"));
        assert!(description.contains("💵 $45.00"));
        assert!(description.contains("📍 @ Green Door (Portland, OR)"));
        assert_eq!(embed["embeds"][0]["color"], COLOR_GREEN);
    }

    #[test]
    fn price_drop_embed_shows_both_prices_and_percent() {
        let e = event(
            EventType::PriceDrop,
            Some(json!({ "price": 60.0 })),
            Some(json!({ "price": 45.0 })),
            Some(json!({ "changePercent": -25.0 })),
        );
        let embed = build_event_embed(&e, &ctx()).unwrap();
        let description = embed["embeds"][0]["description"].as_str().unwrap();
        assert!(description.contains("$60.00 → $45.00 (25% off)"));
    }

    #[test]
    fn new_product_embed_is_blue() {
        let e = event(EventType::NewProduct, None, Some(json!({ "price": 180.0 })), None);
        let embed = build_event_embed(&e, &ctx()).unwrap();
        assert_eq!(embed["embeds"][0]["color"], COLOR_BLUE);
        let footer = embed["embeds"][0]["footer"]["text"].as_str().unwrap();
        assert_eq!(footer, "Watching: fan@example.com");
    }

    #[test]
    fn non_alertable_types_build_nothing() {
        let e = event(EventType::SoldOut, None, None, None);
        assert!(build_event_embed(&e, &ctx()).is_none());
    }

    #[test]
    fn watcher_codes_cover_the_alertable_set() {
        assert_eq!(watcher_code(EventType::Restock), Some("restock"));
        assert_eq!(watcher_code(EventType::PriceDrop), Some("price_drop"));
        assert_eq!(watcher_code(EventType::NewProduct), Some("new_drop"));
        assert_eq!(watcher_code(EventType::SoldOut), None);
        assert_eq!(watcher_code(EventType::QuantityChange), None);
    }
}
