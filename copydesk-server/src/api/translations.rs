//! Translation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use copydesk_common::db::models::Translation;
use copydesk_common::Error;

use crate::db::{articles, contents, translations};
use crate::error::ApiResult;
use crate::tasks;
use crate::AppState;

/// POST /api/translations/{id}/run request
#[derive(Debug, Default, Deserialize)]
pub struct RunTranslationsRequest {
    /// Explicit target languages; default is the article's enabled set
    /// minus the source language
    pub languages: Option<Vec<String>>,
}

/// POST /api/translations/{id}/run
///
/// Preconditions are checked synchronously so the caller gets a proper
/// error; the pipeline itself runs detached.
pub async fn run_translations(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    body: Option<Json<RunTranslationsRequest>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let article = articles::get_article(&state.db, article_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Article {}", article_id)))?;

    let content_ready = contents::get_by_article(&state.db, article_id)
        .await?
        .is_some_and(|c| c.body.as_deref().is_some_and(|b| !b.is_empty()));
    if !content_ready {
        return Err(Error::ContentNotReady(format!(
            "Article {} has no canonical content",
            article_id
        ))
        .into());
    }

    let languages = body.and_then(|Json(b)| b.languages);
    let effective = languages.clone().unwrap_or_else(|| {
        article.target_languages(state.settings.source_language())
    });

    let pipeline = Arc::clone(&state.translation_pipeline);
    tasks::spawn_logged("translation-pipeline", async move {
        pipeline.run(article_id, languages).await
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok": true,
            "article_id": article_id,
            "languages": effective,
        })),
    ))
}

/// GET /api/translations/{id}
pub async fn list_translations(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Translation>>> {
    if articles::get_article(&state.db, article_id).await?.is_none() {
        return Err(Error::NotFound(format!("Article {}", article_id)).into());
    }

    let rows = translations::list_for_article(&state.db, article_id).await?;
    Ok(Json(rows))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/translations/:id/run", post(run_translations))
        .route("/api/translations/:id", get(list_translations))
}
