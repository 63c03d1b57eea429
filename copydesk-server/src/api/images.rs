//! Image generation endpoint

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use copydesk_common::Error;

use crate::db::{articles, contents};
use crate::error::{ApiError, ApiResult};
use crate::services::image_backends::ImageKind;
use crate::tasks;
use crate::AppState;

/// POST /api/images/{id}/generate request
#[derive(Debug, Default, Deserialize)]
pub struct GenerateImageRequest {
    /// Prompt override; default is the prompt stored on the content
    pub prompt: Option<String>,
    pub image_kind: Option<ImageKind>,
}

/// POST /api/images/{id}/generate
///
/// Detaches the backend chain; progress is visible through the
/// image:generating / image:ready / image:failed events.
pub async fn generate_image(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    body: Option<Json<GenerateImageRequest>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if !state.settings.features.image_generation {
        return Err(ApiError::FeatureDisabled("image_generation".to_string()));
    }

    if articles::get_article(&state.db, article_id).await?.is_none() {
        return Err(Error::NotFound(format!("Article {}", article_id)).into());
    }

    let request = body.map(|Json(b)| b).unwrap_or_default();

    let prompt = match request.prompt {
        Some(prompt) if !prompt.trim().is_empty() => prompt,
        _ => contents::get_by_article(&state.db, article_id)
            .await?
            .and_then(|c| c.image_prompt)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest("No image prompt available for this article".to_string())
            })?,
    };
    let kind = request.image_kind.unwrap_or(ImageKind::Illustration);

    let pipeline = Arc::clone(&state.image_pipeline);
    let task_prompt = prompt.clone();
    tasks::spawn_logged("image-pipeline", async move {
        pipeline.run(article_id, task_prompt, kind).await
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok": true,
            "article_id": article_id,
            "prompt": prompt,
            "image_kind": kind,
        })),
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/images/:id/generate", post(generate_image))
}
