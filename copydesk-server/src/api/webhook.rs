//! Workflow engine callback endpoint
//!
//! The engine posts incremental results here as its pipeline progresses.
//! Authenticated by the shared secret in the x-webhook-token header;
//! validation is skipped when no token is configured (development mode).

use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::lifecycle::EngineCallback;
use crate::AppState;

const TOKEN_HEADER: &str = "x-webhook-token";

fn verify_webhook_token(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.settings.engine.webhook_token.as_deref() else {
        return Ok(());
    };

    let provided = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        return Err(ApiError::Unauthorized(
            "Invalid or missing webhook token".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/webhook/engine
pub async fn engine_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<EngineCallback>,
) -> ApiResult<Json<serde_json::Value>> {
    verify_webhook_token(&state, &headers)?;

    let article = state.lifecycle.apply_callback(payload).await?;

    Ok(Json(json!({
        "ok": true,
        "article_id": article.id,
        "status": article.status,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/webhook/engine", post(engine_callback))
}
