//! Seed retailer rows from the curated location file, preserving scrape
//! timestamps already recorded for known sources.

use anyhow::Result;
use tracing::info;

use budwatch_common::MenuLocation;
use budwatch_ingest::models::{MenuSource, Retailer};
use budwatch_ingest::normalizer::normalize_key;
use budwatch_ingest::CatalogStore;

pub async fn seed_retailers(store: &CatalogStore, locations: &[MenuLocation]) -> Result<()> {
    for loc in locations {
        let existing = store.get_retailer(loc.retailer_id).await?;

        let mut menu_sources = vec![MenuSource {
            url: loc.url.clone(),
            platform: loc
                .platform
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            last_scraped_at: None,
        }];
        if let Some(existing) = &existing {
            for source in &mut menu_sources {
                if let Some(known) = existing.menu_sources.iter().find(|s| s.url == source.url) {
                    source.last_scraped_at = known.last_scraped_at;
                }
            }
        }

        let retailer = Retailer {
            id: loc.retailer_id,
            name: loc.retailer_name.clone(),
            slug: normalize_key(&loc.retailer_name),
            license_number: existing.as_ref().and_then(|r| r.license_number.clone()),
            street: existing.as_ref().and_then(|r| r.street.clone()),
            city: existing.as_ref().and_then(|r| r.city.clone()),
            state: existing.as_ref().and_then(|r| r.state.clone()),
            zip: existing.as_ref().and_then(|r| r.zip.clone()),
            lat: existing.as_ref().and_then(|r| r.lat),
            lng: existing.as_ref().and_then(|r| r.lng),
            region: existing.as_ref().and_then(|r| r.region.clone()),
            is_active: loc.active,
            menu_sources,
        };
        store.upsert_retailer(&retailer).await?;
    }

    info!(count = locations.len(), "Retailers seeded");
    Ok(())
}
