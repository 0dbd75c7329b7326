//! Curated location set, loaded from a JSON file at startup.

use anyhow::{Context, Result};
use tracing::info;

use budwatch_common::MenuLocation;

pub fn load_locations(path: &str) -> Result<Vec<MenuLocation>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read locations file {path}"))?;
    let locations = parse_locations(&raw)?;
    info!(
        path,
        total = locations.len(),
        active = locations.iter().filter(|l| l.active).count(),
        "Locations loaded"
    );
    Ok(locations)
}

pub fn parse_locations(raw: &str) -> Result<Vec<MenuLocation>> {
    let locations: Vec<MenuLocation> =
        serde_json::from_str(raw).context("locations file is not a JSON array of locations")?;
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use budwatch_common::SourcePlatform;

    #[test]
    fn parses_a_location_list() {
        let raw = r#"[
            {"retailer_id":"7f1aeb5c-53fb-4dcf-a2e4-02b29a44a2f3",
             "retailer_name":"Green Door",
             "url":"https://dutchie.com/stores/green-door",
             "platform":"dutchie"},
            {"retailer_id":"a31b30c4-9a4e-4f6c-86b5-3f4c5a1de111",
             "retailer_name":"Leaf Lab",
             "url":"https://shop.leafbridge.io/store/9",
             "active":false,
             "disabled_reason":"menu offline"}
        ]"#;

        let locations = parse_locations(raw).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].platform, Some(SourcePlatform::Dutchie));
        assert!(locations[0].active);
        assert!(!locations[1].active);
        assert_eq!(locations[1].disabled_reason.as_deref(), Some("menu offline"));
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(parse_locations("{}").is_err());
    }
}
