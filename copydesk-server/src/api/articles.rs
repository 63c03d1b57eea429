//! Article endpoints: creation, listing, and editor transitions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use copydesk_common::db::models::{
    Article, ArticleStatus, Content, SupervisorDecision, Translation, TriggerKind,
};

use crate::db::{articles, contents, supervisor, translations};
use crate::error::{ApiError, ApiResult};
use crate::lifecycle::CreateArticleInput;
use crate::AppState;

/// Maximum topics per bulk submission
const BULK_LIMIT: usize = 50;

fn default_languages() -> BTreeMap<String, bool> {
    [("de", true), ("en", true), ("es", true), ("fr", true)]
        .into_iter()
        .map(|(lang, enabled)| (lang.to_string(), enabled))
        .collect()
}

/// POST /api/articles request
#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    pub trigger_kind: TriggerKind,
    pub text: String,
    pub category: Option<String>,
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, bool>,
    #[serde(default)]
    pub urls: Vec<String>,
    pub image_kind: Option<String>,
}

/// POST /api/articles/bulk request
#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub topics: Vec<String>,
    pub category: Option<String>,
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize)]
pub struct BulkCreateResponse {
    pub created: Vec<Article>,
    pub skipped: usize,
}

/// Optional feedback carried by approve/revise
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/articles/stats response: queue counts per status
#[derive(Debug, Serialize)]
pub struct QueueStats {
    pub total: i64,
    pub generating: i64,
    pub translating: i64,
    pub review: i64,
    pub published: i64,
    pub failed: i64,
    pub timeout: i64,
    pub paused: i64,
    pub cancelled: i64,
}

/// Full article view: row plus joined content, translations, and the
/// latest supervisor decision
#[derive(Debug, Serialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: Article,
    pub content: Option<Content>,
    pub translations: Vec<Translation>,
    pub supervisor: Option<SupervisorDecision>,
}

pub async fn create_article(
    State(state): State<AppState>,
    Json(request): Json<CreateArticleRequest>,
) -> ApiResult<(StatusCode, Json<Article>)> {
    let article = state
        .lifecycle
        .create(CreateArticleInput {
            trigger_kind: request.trigger_kind,
            text: request.text,
            category: request.category,
            languages: request.languages,
            urls: request.urls,
            image_kind: request.image_kind,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(article)))
}

pub async fn create_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkCreateRequest>,
) -> ApiResult<(StatusCode, Json<BulkCreateResponse>)> {
    if !state.settings.features.bulk_input {
        return Err(ApiError::FeatureDisabled("bulk_input".to_string()));
    }
    if request.topics.is_empty() {
        return Err(ApiError::BadRequest("No topics supplied".to_string()));
    }
    if request.topics.len() > BULK_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "At most {} topics per bulk request",
            BULK_LIMIT
        )));
    }

    let outcome = state
        .lifecycle
        .create_bulk(request.topics, request.category, request.languages)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BulkCreateResponse {
            created: outcome.created,
            skipped: outcome.skipped,
        }),
    ))
}

pub async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Article>>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<ArticleStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let limit = params.limit.clamp(1, 200);
    let offset = params.offset.max(0);

    let articles = articles::list_articles(&state.db, status, limit, offset).await?;
    Ok(Json(articles))
}

pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    let counts = articles::status_counts(&state.db).await?;
    let count = |status: ArticleStatus| counts.get(status.as_str()).copied().unwrap_or(0);

    Ok(Json(QueueStats {
        total: counts.values().sum(),
        generating: count(ArticleStatus::Generating),
        translating: count(ArticleStatus::Translating),
        review: count(ArticleStatus::Review),
        published: count(ArticleStatus::Published),
        failed: count(ArticleStatus::Failed),
        timeout: count(ArticleStatus::Timeout),
        paused: count(ArticleStatus::Paused),
        cancelled: count(ArticleStatus::Cancelled),
    }))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<ArticleDetail>> {
    let article = articles::get_article(&state.db, article_id)
        .await?
        .ok_or_else(|| {
            copydesk_common::Error::NotFound(format!("Article {}", article_id))
        })?;

    let content = contents::get_by_article(&state.db, article_id).await?;
    let translation_rows = translations::list_for_article(&state.db, article_id).await?;
    let latest_decision = supervisor::latest_for_article(&state.db, article_id).await?;

    Ok(Json(ArticleDetail {
        article,
        content,
        translations: translation_rows,
        supervisor: latest_decision,
    }))
}

pub async fn approve_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> ApiResult<Json<Article>> {
    let feedback = body.and_then(|Json(b)| b.feedback);
    let article = state
        .lifecycle
        .approve(article_id, feedback.as_deref())
        .await?;
    Ok(Json(article))
}

pub async fn revise_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> ApiResult<Json<Article>> {
    let feedback = body.and_then(|Json(b)| b.feedback);
    let article = state
        .lifecycle
        .revise(article_id, feedback.as_deref())
        .await?;
    Ok(Json(article))
}

pub async fn cancel_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<Article>> {
    Ok(Json(state.lifecycle.cancel(article_id).await?))
}

pub async fn pause_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<Article>> {
    Ok(Json(state.lifecycle.pause(article_id).await?))
}

pub async fn resume_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<Article>> {
    Ok(Json(state.lifecycle.resume(article_id).await?))
}

pub async fn retry_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<Article>> {
    Ok(Json(state.lifecycle.retry(article_id).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/articles", post(create_article).get(list_articles))
        .route("/api/articles/bulk", post(create_bulk))
        .route("/api/articles/stats", get(queue_stats))
        .route("/api/articles/:id", get(get_article))
        .route("/api/articles/:id/approve", patch(approve_article))
        .route("/api/articles/:id/revise", patch(revise_article))
        .route("/api/articles/:id/cancel", patch(cancel_article))
        .route("/api/articles/:id/pause", patch(pause_article))
        .route("/api/articles/:id/resume", patch(resume_article))
        .route("/api/articles/:id/retry", patch(retry_article))
}
