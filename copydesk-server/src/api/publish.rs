//! CMS publishing endpoint
//!
//! Pushes the canonical content and the approved translations to the CMS.
//! The upload runs detached; completion is announced via publish:complete.

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

use copydesk_common::db::models::TranslationStatus;
use copydesk_common::events::{DeskEvent, EventBus};
use copydesk_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db::{articles, contents, translations};
use crate::error::{ApiError, ApiResult};
use crate::services::cms_client::CmsClient;
use crate::tasks;
use crate::AppState;

/// POST /api/publish/{id} request
#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    /// Restrict translation publishing to these languages;
    /// default publishes every approved translation
    pub languages: Option<Vec<String>>,
}

/// POST /api/publish/{id}
pub async fn publish_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    body: Option<Json<PublishRequest>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if !state.settings.features.publishing {
        return Err(ApiError::FeatureDisabled("publishing".to_string()));
    }
    if !state.cms.is_configured() {
        return Err(Error::ExternalUnavailable("CMS not configured".to_string()).into());
    }

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

    let languages = body.and_then(|Json(b)| b.languages);
    let db = state.db.clone();
    let bus = state.event_bus.clone();
    let cms = Arc::clone(&state.cms);
    let source_language = state.settings.source_language().to_string();

    tasks::spawn_logged("cms-publish", async move {
        run_publish(db, bus, cms, article_id, languages, source_language).await
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "ok": true, "article_id": article_id })),
    ))
}

/// Background upload: canonical post first, then each approved translation.
/// A failed translation upload is logged and skipped; the canonical post
/// decides overall success.
async fn run_publish(
    db: SqlitePool,
    bus: EventBus,
    cms: Arc<CmsClient>,
    article_id: Uuid,
    languages: Option<Vec<String>>,
    source_language: String,
) -> Result<()> {
    let content = contents::get_by_article(&db, article_id)
        .await?
        .ok_or_else(|| Error::ContentNotReady(format!("Article {}", article_id)))?;

    let cms_post_id = cms
        .publish_post(
            &content.title,
            content.body.as_deref().unwrap_or(""),
            content.lead.as_deref().unwrap_or(""),
            Some(&source_language),
            content.seo_title.as_deref(),
            content.seo_description.as_deref(),
        )
        .await?;
    contents::set_cms_post_id(&db, article_id, cms_post_id).await?;

    for translation in translations::list_for_article(&db, article_id).await? {
        if translation.status != TranslationStatus::Approved {
            continue;
        }
        if let Some(languages) = &languages {
            if !languages.contains(&translation.language) {
                continue;
            }
        }
        let Some(body) = translation.body.as_deref() else {
            continue;
        };

        let title = translation.title.as_deref().unwrap_or(&content.title);
        match cms
            .publish_post(
                title,
                body,
                translation.lead.as_deref().unwrap_or(""),
                Some(&translation.language),
                None,
                None,
            )
            .await
        {
            Ok(post_id) => {
                translations::set_cms_post_id(&db, article_id, &translation.language, post_id)
                    .await?;
            }
            Err(e) => {
                tracing::warn!(
                    article_id = %article_id,
                    language = %translation.language,
                    error = %e,
                    "Translation publish failed"
                );
            }
        }
    }

    tracing::info!(article_id = %article_id, cms_post_id, "Article published to CMS");
    bus.emit(DeskEvent::PublishComplete {
        article_id,
        cms_post_id,
    });

    Ok(())
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/publish/:id", post(publish_article))
}
