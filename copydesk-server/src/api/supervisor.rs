//! Supervisor endpoints: evaluation, decision history, tonality profile,
//! topic ranking, deviation statistics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use copydesk_common::db::models::{SupervisorDecision, ToneTrait, TopicRanking};
use copydesk_common::Error;

use crate::db::{articles, contents, profile, supervisor};
use crate::error::ApiResult;
use crate::services::learning;
use crate::tasks;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluationTrigger {
    pub article_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ToneTraitUpdate {
    pub label: String,
    pub value: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// POST /api/supervisor/evaluate
///
/// Preconditions are verified synchronously; the scoring call itself runs
/// detached with a bounded timeout.
pub async fn trigger_evaluation(
    State(state): State<AppState>,
    Json(payload): Json<EvaluationTrigger>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let article_id = payload.article_id;

    if articles::get_article(&state.db, article_id).await?.is_none() {
        return Err(Error::NotFound(format!("Article {}", article_id)).into());
    }
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

    let coordinator = Arc::clone(&state.supervisor);
    tasks::spawn_logged("supervisor-evaluation", async move {
        coordinator.evaluate(article_id).await.map(|_| ())
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "ok": true, "article_id": article_id })),
    ))
}

/// GET /api/supervisor/decisions
pub async fn list_decisions(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Vec<SupervisorDecision>>> {
    let rows = supervisor::list_decisions(
        &state.db,
        params.limit.clamp(1, 200),
        params.offset.max(0),
    )
    .await?;
    Ok(Json(rows))
}

/// GET /api/supervisor/tonality
pub async fn get_tonality_profile(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ToneTrait>>> {
    Ok(Json(profile::list_traits(&state.db).await?))
}

/// POST /api/supervisor/tonality - manual profile entry
pub async fn upsert_tonality_entry(
    State(state): State<AppState>,
    Json(payload): Json<ToneTraitUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    profile::upsert_trait(&state.db, &payload.label, &payload.value, payload.weight).await?;
    Ok(Json(json!({ "ok": true, "label": payload.label })))
}

/// DELETE /api/supervisor/tonality/{trait_id}
pub async fn delete_tonality_entry(
    State(state): State<AppState>,
    Path(trait_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = profile::delete_trait(&state.db, trait_id).await?;
    if !deleted {
        return Err(Error::NotFound(format!("Tone trait {}", trait_id)).into());
    }
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/supervisor/topics
pub async fn get_topic_ranking(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<TopicRanking>>> {
    Ok(Json(profile::list_rankings(&state.db).await?))
}

/// GET /api/supervisor/deviations
pub async fn deviation_statistics(
    State(state): State<AppState>,
) -> ApiResult<Json<learning::DeviationStats>> {
    Ok(Json(learning::deviation_stats(&state.db).await?))
}

/// GET /api/supervisor/dashboard - aggregate view for the supervisor UI
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let traits = profile::list_traits(&state.db).await?;
    let rankings = profile::list_rankings(&state.db).await?;
    let decisions = supervisor::list_decisions(&state.db, 20, 0).await?;
    let stats = learning::deviation_stats(&state.db).await?;

    Ok(Json(json!({
        "tonality_profile": traits,
        "topic_ranking": rankings,
        "recent_decisions": decisions,
        "deviation_stats": stats,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/supervisor/evaluate", post(trigger_evaluation))
        .route("/api/supervisor/decisions", get(list_decisions))
        .route(
            "/api/supervisor/tonality",
            get(get_tonality_profile).post(upsert_tonality_entry),
        )
        .route("/api/supervisor/tonality/:id", delete(delete_tonality_entry))
        .route("/api/supervisor/topics", get(get_topic_ranking))
        .route("/api/supervisor/deviations", get(deviation_statistics))
        .route("/api/supervisor/dashboard", get(dashboard))
}
