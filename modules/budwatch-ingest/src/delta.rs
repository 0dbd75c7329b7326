//! Delta detection: compares one scraped observation against the current
//! inventory row for the same (retailer, product) pair and produces the next
//! row state plus the events the transition warrants. Pure; the engine owns
//! persistence and transaction scope.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{json, Value};

use budwatch_common::{EventType, QuantitySource};

use crate::models::{CurrentInventory, QuantityReading, LOW_STOCK_THRESHOLD, QUANTITY_HISTORY_LIMIT};

/// Price moves at or below this percentage are noise, not events.
const PRICE_EVENT_THRESHOLD_PCT: f64 = 1.0;

/// Quantity moves below this percentage are noise, not events.
const QUANTITY_EVENT_THRESHOLD_PCT: f64 = 20.0;

/// What one scrape observed for a (retailer, product) pair.
#[derive(Debug, Clone)]
pub struct Observation {
    pub price: f64,
    pub in_stock: bool,
    pub quantity: Option<i32>,
    pub quantity_warning: Option<String>,
    pub quantity_source: QuantitySource,
}

/// An event to persist, minus the identifiers the engine fills in.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: EventType,
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    pub metadata: Option<Value>,
}

/// The mutable columns of a current-inventory row after applying an
/// observation.
#[derive(Debug, Clone)]
pub struct InventoryState {
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
}

/// One-decimal rounding shared by price and quantity change percentages.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Apply an observation against the previous row (if any) at `now`, yielding
/// the next state and the detected transition events.
pub fn apply_observation(
    prev: Option<&CurrentInventory>,
    obs: &Observation,
    now: DateTime<Utc>,
) -> (InventoryState, Vec<EventDraft>) {
    match prev {
        None => first_sighting(obs, now),
        Some(prev) => transition(prev, obs, now),
    }
}

fn first_sighting(obs: &Observation, now: DateTime<Utc>) -> (InventoryState, Vec<EventDraft>) {
    let mut events = vec![EventDraft {
        event_type: EventType::NewProduct,
        previous_value: None,
        new_value: Some(json!({
            "price": obs.price,
            "inStock": obs.in_stock,
            "quantity": obs.quantity,
        })),
        metadata: None,
    }];

    if let Some(q) = obs.quantity {
        if q > 0 && q < LOW_STOCK_THRESHOLD {
            events.push(EventDraft {
                event_type: EventType::LowStock,
                previous_value: None,
                new_value: Some(json!({ "quantity": q })),
                metadata: None,
            });
        }
    }

    let state = InventoryState {
        current_price: obs.price,
        previous_price: None,
        price_changed_at: None,
        in_stock: obs.in_stock,
        last_in_stock_at: obs.in_stock.then_some(now),
        out_of_stock_since: (!obs.in_stock).then_some(now),
        quantity: obs.quantity,
        previous_quantity: None,
        quantity_warning: obs.quantity_warning.clone(),
        quantity_source: obs.quantity.map(|_| obs.quantity_source.to_string()),
        last_quantity_at: obs.quantity.map(|_| now),
        quantity_history: obs
            .quantity
            .map(|q| {
                vec![QuantityReading {
                    quantity: q,
                    timestamp: now,
                    source: obs.quantity_source.to_string(),
                }]
            })
            .unwrap_or_default(),
        days_on_menu: 1,
        last_updated_at: now,
    };

    (state, events)
}

fn transition(
    prev: &CurrentInventory,
    obs: &Observation,
    now: DateTime<Utc>,
) -> (InventoryState, Vec<EventDraft>) {
    let mut events = Vec::new();
    let mut state = InventoryState {
        current_price: obs.price,
        previous_price: prev.previous_price,
        price_changed_at: prev.price_changed_at,
        in_stock: obs.in_stock,
        last_in_stock_at: prev.last_in_stock_at,
        out_of_stock_since: prev.out_of_stock_since,
        quantity: obs.quantity.or(prev.quantity),
        previous_quantity: prev.previous_quantity,
        quantity_warning: obs.quantity_warning.clone(),
        quantity_source: prev.quantity_source.clone(),
        last_quantity_at: prev.last_quantity_at,
        quantity_history: prev.quantity_history.clone(),
        days_on_menu: prev.days_on_menu,
        last_updated_at: now,
    };

    // Price
    if (obs.price - prev.current_price).abs() > f64::EPSILON {
        state.previous_price = Some(prev.current_price);
        state.price_changed_at = Some(now);

        let pct = (obs.price - prev.current_price) / prev.current_price * 100.0;
        // Strictly above the threshold; the margin absorbs float noise at the
        // boundary (a move of exactly 1% stays silent).
        if pct.abs() > PRICE_EVENT_THRESHOLD_PCT + 1e-9 {
            events.push(EventDraft {
                event_type: if obs.price < prev.current_price {
                    EventType::PriceDrop
                } else {
                    EventType::PriceIncrease
                },
                previous_value: Some(json!({ "price": prev.current_price })),
                new_value: Some(json!({ "price": obs.price })),
                metadata: Some(json!({ "changePercent": round1(pct) })),
            });
        }
    }

    // Stock
    if !prev.in_stock && obs.in_stock {
        state.last_in_stock_at = Some(now);
        state.out_of_stock_since = None;
        events.push(EventDraft {
            event_type: EventType::Restock,
            previous_value: Some(json!({ "inStock": false })),
            new_value: Some(json!({ "inStock": true, "price": obs.price, "quantity": obs.quantity })),
            metadata: None,
        });
    } else if prev.in_stock && !obs.in_stock {
        state.out_of_stock_since = Some(now);
        events.push(EventDraft {
            event_type: EventType::SoldOut,
            previous_value: Some(json!({ "inStock": true })),
            new_value: Some(json!({ "inStock": false })),
            metadata: None,
        });
    }

    // Quantity, when both snapshots carry one
    if let (Some(prev_q), Some(q)) = (prev.quantity, obs.quantity) {
        if prev_q >= LOW_STOCK_THRESHOLD && q > 0 && q < LOW_STOCK_THRESHOLD {
            events.push(EventDraft {
                event_type: EventType::LowStock,
                previous_value: Some(json!({ "quantity": prev_q })),
                new_value: Some(json!({ "quantity": q })),
                metadata: None,
            });
        }

        if prev_q > 0 {
            let pct = (q - prev_q) as f64 / prev_q as f64 * 100.0;
            // Inclusive at the threshold (a 20% move counts).
            if pct.abs() >= QUANTITY_EVENT_THRESHOLD_PCT - 1e-9 {
                events.push(EventDraft {
                    event_type: EventType::QuantityChange,
                    previous_value: Some(json!({ "quantity": prev_q })),
                    new_value: Some(json!({ "quantity": q })),
                    metadata: Some(json!({
                        "changePercent": round1(pct),
                        "direction": if q > prev_q { "increase" } else { "decrease" },
                    })),
                });
            }
        }

        // Record the reading when it is new information. Re-ingesting an
        // identical batch must not grow the history.
        if q != prev_q {
            state.previous_quantity = prev.quantity;
            state.last_quantity_at = Some(now);
            state.quantity_source = Some(obs.quantity_source.to_string());
            state.quantity_history.insert(
                0,
                QuantityReading {
                    quantity: q,
                    timestamp: now,
                    source: obs.quantity_source.to_string(),
                },
            );
            state.quantity_history.truncate(QUANTITY_HISTORY_LIMIT);
        }
    } else if obs.quantity.is_none() {
        // Quantity invisible, but the card may carry a warning string.
        if let Some(warning) = &obs.quantity_warning {
            if let Some(estimate) = parse_warning_quantity(warning) {
                let transitioned_in = prev.quantity_warning.is_none();
                let n = estimate.unwrap_or(1);
                if transitioned_in || n < LOW_STOCK_THRESHOLD {
                    events.push(EventDraft {
                        event_type: EventType::LowStock,
                        previous_value: None,
                        new_value: Some(json!({ "estimatedQuantity": n })),
                        metadata: Some(json!({ "source": "warning_text" })),
                    });
                }
            }
        }
    }

    // Days on menu
    let elapsed_days = (now - prev.last_updated_at).num_days();
    if elapsed_days >= 1 {
        state.days_on_menu += elapsed_days as i32;
    }

    (state, events)
}

/// Event for a row that dropped off the menu. The sweep in the engine decides
/// which rows qualify; the row itself is kept.
pub fn removed_event(row: &CurrentInventory) -> EventDraft {
    EventDraft {
        event_type: EventType::Removed,
        previous_value: Some(json!({
            "price": row.current_price,
            "inStock": row.in_stock,
            "quantity": row.quantity,
        })),
        new_value: None,
        metadata: None,
    }
}

static WARNING_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)only\s+(\d+)\s+left|(\d+)\s+remaining|low\s+stock").unwrap()
});

/// Parse a low-stock warning string. `Some(Some(n))` when a count is present,
/// `Some(None)` for a bare "low stock", `None` when the string is not a
/// warning at all.
pub fn parse_warning_quantity(warning: &str) -> Option<Option<i32>> {
    let caps = WARNING_QUANTITY.captures(warning)?;
    let n = caps
        .get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok());
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn obs(price: f64, in_stock: bool, quantity: Option<i32>) -> Observation {
        Observation {
            price,
            in_stock,
            quantity,
            quantity_warning: None,
            quantity_source: QuantitySource::TextPattern,
        }
    }

    fn row_from(state: &InventoryState) -> CurrentInventory {
        CurrentInventory {
            id: Uuid::new_v4(),
            retailer_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            current_price: state.current_price,
            previous_price: state.previous_price,
            price_changed_at: state.price_changed_at,
            in_stock: state.in_stock,
            last_in_stock_at: state.last_in_stock_at,
            out_of_stock_since: state.out_of_stock_since,
            quantity: state.quantity,
            previous_quantity: state.previous_quantity,
            quantity_warning: state.quantity_warning.clone(),
            quantity_source: state.quantity_source.clone(),
            last_quantity_at: state.last_quantity_at,
            quantity_history: state.quantity_history.clone(),
            days_on_menu: state.days_on_menu,
            last_updated_at: state.last_updated_at,
            last_snapshot_id: None,
            removed_at: None,
        }
    }

    fn types(events: &[EventDraft]) -> Vec<EventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn first_sighting_emits_new_product_and_low_stock() {
        let now = Utc::now();
        let (state, events) = apply_observation(None, &obs(180.0, true, Some(3)), now);

        assert_eq!(types(&events), vec![EventType::NewProduct, EventType::LowStock]);
        assert_eq!(state.days_on_menu, 1);
        assert_eq!(state.last_in_stock_at, Some(now));
        assert_eq!(state.quantity_history.len(), 1);
        assert_eq!(state.quantity_history[0].quantity, 3);
        assert_eq!(state.quantity_history[0].source, "text_pattern");
    }

    #[test]
    fn first_sighting_at_threshold_has_no_low_stock() {
        let now = Utc::now();
        let (_, events) = apply_observation(None, &obs(60.0, true, Some(5)), now);
        assert_eq!(types(&events), vec![EventType::NewProduct]);
    }

    #[test]
    fn price_drop_emits_once_with_rounded_percent() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(60.0, true, Some(10)), now);
        let prev = row_from(&prev_state);

        let later = now + Duration::minutes(15);
        let (state, events) = apply_observation(Some(&prev), &obs(45.0, true, Some(10)), later);

        assert_eq!(types(&events), vec![EventType::PriceDrop]);
        let event = &events[0];
        assert_eq!(event.previous_value.as_ref().unwrap()["price"], 60.0);
        assert_eq!(event.new_value.as_ref().unwrap()["price"], 45.0);
        assert_eq!(event.metadata.as_ref().unwrap()["changePercent"], -25.0);
        assert_eq!(state.previous_price, Some(60.0));
        assert_eq!(state.price_changed_at, Some(later));
    }

    #[test]
    fn exact_one_percent_move_records_price_but_emits_nothing() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(100.0, true, None), now);
        let prev = row_from(&prev_state);

        let (state, events) = apply_observation(Some(&prev), &obs(99.0, true, None), now);
        assert!(events.is_empty());
        assert_eq!(state.previous_price, Some(100.0));
        assert!(state.price_changed_at.is_some());
    }

    #[test]
    fn price_increase_above_threshold_emits() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(100.0, true, None), now);
        let prev = row_from(&prev_state);

        let (_, events) = apply_observation(Some(&prev), &obs(102.0, true, None), now);
        assert_eq!(types(&events), vec![EventType::PriceIncrease]);
        assert_eq!(events[0].metadata.as_ref().unwrap()["changePercent"], 2.0);
    }

    #[test]
    fn restock_clears_out_of_stock_and_skips_quantity_change() {
        let t0 = Utc::now();
        let (mut prev_state, _) = apply_observation(None, &obs(50.0, false, Some(0)), t0);
        prev_state.out_of_stock_since = Some(t0);
        let prev = row_from(&prev_state);

        let later = t0 + Duration::hours(1);
        let (state, events) = apply_observation(Some(&prev), &obs(50.0, true, Some(8)), later);

        assert_eq!(types(&events), vec![EventType::Restock]);
        assert_eq!(state.last_in_stock_at, Some(later));
        assert_eq!(state.out_of_stock_since, None);
        assert_eq!(state.quantity, Some(8));
    }

    #[test]
    fn sold_out_sets_out_of_stock_since() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(50.0, true, None), now);
        let prev = row_from(&prev_state);

        let later = now + Duration::minutes(30);
        let (state, events) = apply_observation(Some(&prev), &obs(50.0, false, None), later);

        assert_eq!(types(&events), vec![EventType::SoldOut]);
        assert_eq!(state.out_of_stock_since, Some(later));
        assert_eq!(state.last_in_stock_at, prev.last_in_stock_at);
    }

    #[test]
    fn low_stock_boundary_is_exclusive_of_threshold() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(50.0, true, Some(10)), now);
        let prev = row_from(&prev_state);

        // 10 → 4 crosses into low stock (and is a ≥20% move).
        let (_, events) = apply_observation(Some(&prev), &obs(50.0, true, Some(4)), now);
        assert_eq!(
            types(&events),
            vec![EventType::LowStock, EventType::QuantityChange]
        );

        // 10 → 5 is a big move but not low stock.
        let (_, events) = apply_observation(Some(&prev), &obs(50.0, true, Some(5)), now);
        assert_eq!(types(&events), vec![EventType::QuantityChange]);
    }

    #[test]
    fn quantity_change_threshold_is_inclusive_at_twenty_percent() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(50.0, true, Some(10)), now);
        let prev = row_from(&prev_state);

        let (_, events) = apply_observation(Some(&prev), &obs(50.0, true, Some(8)), now);
        assert_eq!(types(&events), vec![EventType::QuantityChange]);
        let meta = events[0].metadata.as_ref().unwrap();
        assert_eq!(meta["changePercent"], -20.0);
        assert_eq!(meta["direction"], "decrease");

        // 10 → 9 is only 10%.
        let (_, events) = apply_observation(Some(&prev), &obs(50.0, true, Some(9)), now);
        assert!(events.is_empty());
    }

    #[test]
    fn quantity_increase_direction_is_reported() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(50.0, true, Some(10)), now);
        let prev = row_from(&prev_state);

        let (_, events) = apply_observation(Some(&prev), &obs(50.0, true, Some(15)), now);
        assert_eq!(types(&events), vec![EventType::QuantityChange]);
        assert_eq!(events[0].metadata.as_ref().unwrap()["direction"], "increase");
    }

    #[test]
    fn quantity_appearing_for_the_first_time_is_not_recorded() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(50.0, true, None), now);
        let prev = row_from(&prev_state);

        // The previous snapshot had no reading, so nothing fires and the
        // history stays empty; only the current quantity is carried.
        let (state, events) = apply_observation(Some(&prev), &obs(50.0, true, Some(6)), now);
        assert!(events.is_empty());
        assert_eq!(state.quantity, Some(6));
        assert!(state.quantity_history.is_empty());
        assert_eq!(state.previous_quantity, None);
        assert_eq!(state.last_quantity_at, None);
    }

    #[test]
    fn quantity_history_is_bounded_and_newest_first() {
        let mut now = Utc::now();
        let (mut state, _) = apply_observation(None, &obs(50.0, true, Some(100)), now);

        for q in (1..=14).rev() {
            now += Duration::minutes(15);
            let prev = row_from(&state);
            let (next, _) = apply_observation(Some(&prev), &obs(50.0, true, Some(q)), now);
            state = next;
        }

        assert_eq!(state.quantity_history.len(), QUANTITY_HISTORY_LIMIT);
        assert_eq!(state.quantity_history[0].quantity, 1);
        for pair in state.quantity_history.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn warning_only_low_stock_on_transition_in() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(50.0, true, None), now);
        let prev = row_from(&prev_state);

        let warned = Observation {
            price: 50.0,
            in_stock: true,
            quantity: None,
            quantity_warning: Some("Only 2 left!".to_string()),
            quantity_source: QuantitySource::WarningText,
        };
        let (state, events) = apply_observation(Some(&prev), &warned, now);
        assert_eq!(types(&events), vec![EventType::LowStock]);
        assert_eq!(
            events[0].new_value.as_ref().unwrap()["estimatedQuantity"],
            2
        );
        assert_eq!(state.quantity_warning.as_deref(), Some("Only 2 left!"));
    }

    #[test]
    fn bare_low_stock_warning_estimates_one() {
        let now = Utc::now();
        let (prev_state, _) = apply_observation(None, &obs(50.0, true, None), now);
        let prev = row_from(&prev_state);

        let warned = Observation {
            price: 50.0,
            in_stock: true,
            quantity: None,
            quantity_warning: Some("low stock".to_string()),
            quantity_source: QuantitySource::WarningText,
        };
        let (_, events) = apply_observation(Some(&prev), &warned, now);
        assert_eq!(types(&events), vec![EventType::LowStock]);
        assert_eq!(
            events[0].new_value.as_ref().unwrap()["estimatedQuantity"],
            1
        );
    }

    #[test]
    fn days_on_menu_accumulates_whole_days() {
        let t0 = Utc::now();
        let (state, _) = apply_observation(None, &obs(50.0, true, None), t0);

        // 20 hours later: no increment.
        let prev = row_from(&state);
        let (state, _) = apply_observation(Some(&prev), &obs(50.0, true, None), t0 + Duration::hours(20));
        assert_eq!(state.days_on_menu, 1);

        // 3 days after first sighting: floor(3 days - 20 hours elapsed) from
        // the last update.
        let prev = row_from(&state);
        let (state, _) =
            apply_observation(Some(&prev), &obs(50.0, true, None), t0 + Duration::hours(68));
        assert_eq!(state.days_on_menu, 3);
    }

    #[test]
    fn reapplying_the_same_observation_is_silent() {
        let now = Utc::now();
        let first = obs(45.0, true, Some(10));
        let (state, _) = apply_observation(None, &first, now);

        let prev = row_from(&state);
        let (next, events) = apply_observation(Some(&prev), &first, now);

        assert!(events.is_empty());
        assert_eq!(next.current_price, state.current_price);
        assert_eq!(next.previous_price, state.previous_price);
        assert_eq!(next.quantity, state.quantity);
        assert_eq!(next.quantity_history, state.quantity_history);
        assert_eq!(next.days_on_menu, state.days_on_menu);
    }

    #[test]
    fn removed_event_carries_pre_transition_state() {
        let now = Utc::now();
        let (state, _) = apply_observation(None, &obs(65.0, true, Some(7)), now);
        let row = row_from(&state);

        let event = removed_event(&row);
        assert_eq!(event.event_type, EventType::Removed);
        let prev = event.previous_value.unwrap();
        assert_eq!(prev["price"], 65.0);
        assert_eq!(prev["inStock"], true);
        assert_eq!(prev["quantity"], 7);
    }

    #[test]
    fn warning_parser_handles_known_shapes() {
        assert_eq!(parse_warning_quantity("Only 3 left"), Some(Some(3)));
        assert_eq!(parse_warning_quantity("2 remaining"), Some(Some(2)));
        assert_eq!(parse_warning_quantity("Low Stock"), Some(None));
        assert_eq!(parse_warning_quantity("plenty available"), None);
    }
}
