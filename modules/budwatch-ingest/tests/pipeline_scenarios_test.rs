//! End-to-end pipeline scenarios through the public normalizer and delta
//! APIs: a raw scraped card in, canonical fields and transition events out.

use chrono::{Duration, Utc};
use uuid::Uuid;

use budwatch_common::{EventType, QuantitySource, WeightUnit};
use budwatch_ingest::delta::{apply_observation, removed_event, InventoryState, Observation};
use budwatch_ingest::models::CurrentInventory;
use budwatch_ingest::normalizer::{normalize, normalize_key, Category, NormalizeInput, StrainType};

fn observation(price: f64, in_stock: bool, quantity: Option<i32>) -> Observation {
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

#[test]
fn new_product_scenario_normalizes_and_emits_low_stock() {
    // One embedded-menu card with the brand echoed on both ends and the
    // strain glued onto the name by DOM concatenation.
    let normalized = normalize(&NormalizeInput {
        raw_name: "Grocery | 28g Flower - Sativa | Black DieselGrocerySativaTHC: 29.21%",
        raw_brand: Some("Grocery"),
        ..Default::default()
    });

    assert_eq!(normalize_key("Grocery"), "grocery");
    assert_eq!(normalized.name, "Black Diesel");
    assert_eq!(normalized.strain, Some(StrainType::Sativa));
    assert_eq!(normalized.category, Category::Flower);
    let weight = normalized.weight.unwrap();
    assert_eq!(weight.amount, 28.0);
    assert_eq!(weight.unit, WeightUnit::G);
    assert_eq!(normalized.thc, Some(29.21));

    let now = Utc::now();
    let (state, events) = apply_observation(None, &observation(180.0, true, Some(3)), now);

    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![EventType::NewProduct, EventType::LowStock]);
    assert_eq!(state.days_on_menu, 1);
    assert_eq!(state.quantity_history.len(), 1);
    assert_eq!(state.quantity_history[0].quantity, 3);
}

#[test]
fn price_drop_scenario_emits_exactly_once() {
    let now = Utc::now();
    let (seeded, _) = apply_observation(None, &observation(60.0, true, Some(10)), now);
    let prev = row_from(&seeded);

    let later = now + Duration::minutes(15);
    let (state, events) = apply_observation(Some(&prev), &observation(45.0, true, Some(10)), later);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::PriceDrop);
    assert_eq!(events[0].previous_value.as_ref().unwrap()["price"], 60.0);
    assert_eq!(events[0].new_value.as_ref().unwrap()["price"], 45.0);
    assert_eq!(events[0].metadata.as_ref().unwrap()["changePercent"], -25.0);
    assert_eq!(state.previous_price, Some(60.0));
    assert_eq!(state.price_changed_at, Some(later));

    // Re-ingesting the identical observation produces nothing further.
    let again = row_from(&state);
    let (_, events) = apply_observation(Some(&again), &observation(45.0, true, Some(10)), later);
    assert!(events.is_empty());
}

#[test]
fn restock_scenario_resurfaces_quantity_without_noise() {
    let t0 = Utc::now();
    let (mut seeded, _) = apply_observation(None, &observation(50.0, false, Some(0)), t0);
    seeded.out_of_stock_since = Some(t0);
    let prev = row_from(&seeded);

    let later = t0 + Duration::hours(2);
    let (state, events) = apply_observation(Some(&prev), &observation(50.0, true, Some(8)), later);

    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![EventType::Restock]);
    assert_eq!(state.last_in_stock_at, Some(later));
    assert_eq!(state.out_of_stock_since, None);
    assert_eq!(state.quantity, Some(8));
}

#[test]
fn removed_scenario_preserves_the_final_state() {
    let t0 = Utc::now();
    let (seeded, _) = apply_observation(None, &observation(65.0, true, Some(7)), t0);
    let row = row_from(&seeded);

    // Over an hour later the product is absent from the batch; the sweep
    // emits removed with the pre-transition values and keeps the row.
    let event = removed_event(&row);
    assert_eq!(event.event_type, EventType::Removed);
    let prev = event.previous_value.unwrap();
    assert_eq!(prev["price"], 65.0);
    assert_eq!(prev["inStock"], true);
    assert_eq!(prev["quantity"], 7);
}
