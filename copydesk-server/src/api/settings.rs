//! Read-only runtime settings
//!
//! Exposes the non-secret configuration the UI needs (retry windows, poll
//! intervals, feature switches). Secrets and provider credentials never
//! leave the process.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::AppState;

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = &state.settings;

    Json(json!({
        "source_language": settings.source_language(),
        "queue": {
            "watchdog_interval_secs": settings.queue.watchdog_interval_secs,
            "retry_window_secs": settings.queue.retry_window_secs,
            "max_retries": settings.queue.max_retries,
        },
        "image": {
            "poll_timeout_secs": settings.image.poll_timeout_secs,
            "poll_interval_secs": settings.image.poll_interval_secs,
            "cloud_backend_configured": settings.image.cloud_url.is_some(),
        },
        "features": {
            "bulk_input": settings.features.bulk_input,
            "image_generation": settings.features.image_generation,
            "publishing": settings.features.publishing,
        },
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings))
}
