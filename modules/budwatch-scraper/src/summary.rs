//! Operator summary embed posted at the end of each tick.

use serde_json::{json, Value};
use tracing::warn;

use crate::orchestrator::TickOutcome;

const COLOR_GREEN: u32 = 0x57F287;
const COLOR_ORANGE: u32 = 0xE67E22;
const COLOR_RED: u32 = 0xED4245;

const MAX_ERRORS_LISTED: usize = 5;
const ERROR_TRUNCATE_AT: usize = 1000;

/// Green when everything succeeded, orange for a partial tick, red when every
/// location failed.
fn severity_color(outcome: &TickOutcome) -> u32 {
    if outcome.locations_failed == 0 {
        COLOR_GREEN
    } else if outcome.locations_succeeded > 0 {
        COLOR_ORANGE
    } else {
        COLOR_RED
    }
}

pub fn build_summary_embed(outcome: &TickOutcome) -> Value {
    let mut description = format!(
        "Locations: {} ok / {} failed\nItems scraped: {}",
        outcome.locations_succeeded, outcome.locations_failed, outcome.total_items
    );

    if !outcome.errors.is_empty() {
        description.push_str("\n\n**Errors:**");
        for error in outcome.errors.iter().take(MAX_ERRORS_LISTED) {
            let mut line = error.clone();
            if line.len() > ERROR_TRUNCATE_AT {
                line.truncate(ERROR_TRUNCATE_AT);
                line.push('…');
            }
            description.push_str("\n- ");
            description.push_str(&line);
        }
        let extra = outcome.errors.len().saturating_sub(MAX_ERRORS_LISTED);
        if extra > 0 {
            description.push_str(&format!("\n…and {extra} more"));
        }
    }

    json!({
        "embeds": [{
            "title": format!("Scrape tick {}", outcome.batch_id),
            "description": description,
            "color": severity_color(outcome),
        }]
    })
}

/// Best-effort webhook post; a summary never fails the tick.
pub async fn post_operator_summary(http: &reqwest::Client, webhook_url: &str, payload: Value) {
    match http.post(webhook_url).json(&payload).send().await {
        Ok(resp) if !resp.status().is_success() => {
            warn!(status = resp.status().as_u16(), "Operator summary rejected");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Operator summary post failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(ok: usize, failed: usize, errors: Vec<String>) -> TickOutcome {
        TickOutcome {
            batch_id: "b1".into(),
            skipped: false,
            locations_succeeded: ok,
            locations_failed: failed,
            total_items: 10,
            errors,
            ingest_response: None,
        }
    }

    #[test]
    fn color_tracks_severity() {
        assert_eq!(severity_color(&outcome(3, 0, vec![])), COLOR_GREEN);
        assert_eq!(severity_color(&outcome(2, 1, vec!["x".into()])), COLOR_ORANGE);
        assert_eq!(severity_color(&outcome(0, 3, vec!["x".into()])), COLOR_RED);
    }

    #[test]
    fn at_most_five_errors_are_listed() {
        let errors: Vec<String> = (0..8).map(|i| format!("loc{i}: boom")).collect();
        let embed = build_summary_embed(&outcome(0, 8, errors));
        let description = embed["embeds"][0]["description"].as_str().unwrap();
        assert_eq!(description.matches("\n- ").count(), 5);
        assert!(description.contains("and 3 more"));
    }

    #[test]
    fn long_errors_are_truncated() {
        let long = "x".repeat(5000);
        let embed = build_summary_embed(&outcome(0, 1, vec![long]));
        let description = embed["embeds"][0]["description"].as_str().unwrap();
        assert!(description.len() < 1500);
        assert!(description.contains('…'));
    }
}
