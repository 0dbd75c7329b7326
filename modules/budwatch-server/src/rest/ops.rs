use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::state::AppState;

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let total = state.locations.len();
    let active = state.locations.iter().filter(|l| l.active).count();

    Json(json!({
        "status": "ok",
        "locations": {
            "total": total,
            "active": active,
            "disabled": total - active,
        },
        "schedule": format!("every {} minutes", state.config.scrape_interval_minutes),
        "features": ["scrape", "ingest", "notify", "retry_queue", "health_monitor"],
    }))
}

/// `POST /trigger` — fire one orchestrator tick in the background.
pub async fn trigger_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    let dispatcher = state.dispatcher.clone();

    tokio::spawn(async move {
        let outcome = orchestrator.tick().await;
        if outcome.skipped {
            info!("Triggered tick skipped, previous tick still running");
            return;
        }
        if let Err(e) = dispatcher.run_once().await {
            warn!(error = %e, "Post-tick dispatch failed");
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "triggered": true })))
}

/// `GET /locations`
pub async fn locations_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!(state.locations))
}

/// `POST /alerts/check` — run the health monitor now. `{"force": true}`
/// bypasses the per-type cooldowns.
pub async fn alerts_check_handler(
    State(state): State<Arc<AppState>>,
    body: String,
) -> impl IntoResponse {
    let force = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("force").and_then(Value::as_bool))
        .unwrap_or(false);

    match state.monitor.check_and_alert(force).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "triggered": outcome.triggered,
                "alerted": outcome.alerted,
                "suppressed": outcome.suppressed,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}
