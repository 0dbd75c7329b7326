use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde_json::json;
use tracing::error;

use budwatch_common::ScrapeBatch;

use crate::state::AppState;

/// `POST /ingest/scraped-batch` — one scraped batch in, an ingest summary
/// out. Guarded by the optional shared key.
pub async fn ingest_batch_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ScrapeBatch>, JsonRejection>,
) -> impl IntoResponse {
    if let Some(expected) = &state.config.ingest_api_key {
        let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "invalid API key" })),
            );
        }
    }

    let Json(batch) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": rejection.body_text() })),
            );
        }
    };
    if batch.batch_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "batchId is required" })),
        );
    }

    match state.engine.ingest_batch(&batch).await {
        Ok(summary) => {
            let mut response = serde_json::to_value(&summary).unwrap_or_default();
            if let Some(object) = response.as_object_mut() {
                object.insert("success".to_string(), json!(true));
            }
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            error!(batch_id = %batch.batch_id, error = %e, "Batch ingestion failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}
