//! Article lifecycle state machine
//!
//! The single source of truth for status changes. Every transition is a
//! guarded UPDATE on the article's row; a guard miss yields
//! `InvalidStateTransition`, never a silent no-op. Follow-on work (engine
//! trigger, embedding) detaches here so requests stay fast.
//!
//! Transition table:
//!
//! | from                      | event    | to         |
//! |---------------------------|----------|------------|
//! | (none)                    | create   | generating |
//! | generating/translating/review | callback | as delivered |
//! | review, generating        | approve  | published  |
//! | any                       | revise   | generating |
//! | generating, paused        | cancel   | cancelled  |
//! | generating                | pause    | paused     |
//! | paused                    | resume   | generating |
//! | failed, timeout, cancelled| retry    | generating |

use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use copydesk_common::config::Settings;
use copydesk_common::db::models::{
    Article, ArticleStatus, Recommendation, TranslationStatus, TriggerKind,
};
use copydesk_common::events::{DeskEvent, EventBus};
use copydesk_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db::contents::ContentPatch;
use crate::db::supervisor::NewDecision;
use crate::db::translations::TranslationPatch;
use crate::db::{articles, contents, supervisor, translations};
use crate::services::engine_client::EngineClient;
use crate::services::fingerprint::request_fingerprint;
use crate::services::learning;
use crate::services::llm_client::{build_embedding_text, LlmClient};
use crate::tasks;

/// Creation request after route-level validation
#[derive(Debug, Clone)]
pub struct CreateArticleInput {
    pub trigger_kind: TriggerKind,
    pub text: String,
    pub category: Option<String>,
    pub languages: BTreeMap<String, bool>,
    pub urls: Vec<String>,
    pub image_kind: Option<String>,
}

/// Engine callback payload (see the webhook endpoint)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCallback {
    pub article_id: Uuid,
    pub status: ArticleStatus,
    pub title: Option<String>,
    pub lead: Option<String>,
    pub body: Option<String>,
    pub sources: Option<serde_json::Value>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub image_prompt: Option<String>,
    pub translations: Option<BTreeMap<String, CallbackTranslation>>,
    pub supervisor: Option<CallbackSupervisor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackTranslation {
    pub title: Option<String>,
    pub lead: Option<String>,
    pub body: Option<String>,
    pub status: Option<TranslationStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackSupervisor {
    pub recommendation: Recommendation,
    pub justification: String,
    pub score: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Outcome of a bulk submission
#[derive(Debug)]
pub struct BulkOutcome {
    pub created: Vec<Article>,
    pub skipped: usize,
}

pub struct ArticleLifecycle {
    db: SqlitePool,
    bus: EventBus,
    settings: Arc<Settings>,
    engine: Arc<EngineClient>,
    llm: Arc<LlmClient>,
}

impl ArticleLifecycle {
    pub fn new(
        db: SqlitePool,
        bus: EventBus,
        settings: Arc<Settings>,
        engine: Arc<EngineClient>,
        llm: Arc<LlmClient>,
    ) -> Self {
        Self {
            db,
            bus,
            settings,
            engine,
            llm,
        }
    }

    fn retry_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.settings.queue.retry_window_secs)
    }

    /// Create an article and fire the generation trigger.
    ///
    /// Rejects the request when an article with the same fingerprint is
    /// still active (anything outside failed/cancelled).
    pub async fn create(&self, input: CreateArticleInput) -> Result<Article> {
        let content_hash = request_fingerprint(input.trigger_kind, &input.text, &input.urls);

        if let Some(existing_id) = articles::find_active_by_hash(&self.db, &content_hash).await? {
            return Err(Error::DuplicateContent { existing_id });
        }

        let new = articles::NewArticle {
            id: Uuid::new_v4(),
            title: derive_title(&input.text),
            trigger_kind: input.trigger_kind,
            category: input.category.clone(),
            languages: input.languages.clone(),
            context_urls: input.urls.clone(),
            content_hash,
            max_retries: self.settings.queue.max_retries,
            timeout_at: Utc::now() + self.retry_window(),
        };
        let article = articles::insert_article(&self.db, &new).await?;

        // Best-effort: an unreachable engine leaves the article in
        // `generating` for the watchdog to pick up
        self.engine
            .trigger_generation(
                article.id,
                article.trigger_kind,
                &input.text,
                input.category.as_deref(),
                &article.languages,
                &input.urls,
                input.image_kind.as_deref(),
            )
            .await;

        tracing::info!(article_id = %article.id, title = %article.title, "Article created");
        self.bus.emit(DeskEvent::ArticleCreated {
            id: article.id,
            title: article.title.clone(),
            status: article.status.as_str().to_string(),
        });

        Ok(article)
    }

    /// Bulk topic submission: duplicates are skipped silently instead of
    /// failing the whole batch
    pub async fn create_bulk(
        &self,
        topics: Vec<String>,
        category: Option<String>,
        languages: BTreeMap<String, bool>,
    ) -> Result<BulkOutcome> {
        let mut created = Vec::new();
        let mut skipped = 0;

        for topic in topics {
            let input = CreateArticleInput {
                trigger_kind: TriggerKind::Prompt,
                text: topic,
                category: category.clone(),
                languages: languages.clone(),
                urls: Vec::new(),
                image_kind: None,
            };
            match self.create(input).await {
                Ok(article) => created.push(article),
                Err(Error::DuplicateContent { existing_id }) => {
                    tracing::debug!(existing_id = %existing_id, "Bulk topic skipped as duplicate");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(BulkOutcome { created, skipped })
    }

    /// Editor approval: publishable from review or directly from generating
    pub async fn approve(&self, article_id: Uuid, feedback: Option<&str>) -> Result<Article> {
        let article = self.require_article(article_id).await?;

        let moved = articles::transition_status(
            &self.db,
            article_id,
            &[ArticleStatus::Review, ArticleStatus::Generating],
            ArticleStatus::Published,
            None,
        )
        .await?;
        if !moved {
            return Err(Error::InvalidStateTransition(format!(
                "Article in status '{}' cannot be approved",
                article.status
            )));
        }

        learning::apply_editor_decision(&self.db, &article, Recommendation::Approve, feedback)
            .await?;
        self.spawn_embedding_if_absent(article_id);

        tracing::info!(article_id = %article_id, "Article approved");
        self.bus.emit(DeskEvent::ArticleApproved {
            id: article_id,
            title: article.title,
        });

        self.require_article(article_id).await
    }

    /// Send the article back through generation; allowed from any status
    pub async fn revise(&self, article_id: Uuid, feedback: Option<&str>) -> Result<Article> {
        let article = self.require_article(article_id).await?;

        articles::transition_status(
            &self.db,
            article_id,
            &ArticleStatus::ALL,
            ArticleStatus::Generating,
            Some(Utc::now() + self.retry_window()),
        )
        .await?;

        learning::apply_editor_decision(&self.db, &article, Recommendation::Revise, feedback)
            .await?;

        self.engine
            .trigger_generation(
                article.id,
                article.trigger_kind,
                feedback.unwrap_or(""),
                article.category.as_deref(),
                &article.languages,
                &[],
                None,
            )
            .await;

        tracing::info!(article_id = %article_id, "Article sent back for revision");
        self.bus.emit(DeskEvent::ArticleRevised {
            id: article_id,
            title: article.title,
        });

        self.require_article(article_id).await
    }

    /// Soft cancel: the state machine stops, an in-flight engine job is not
    /// aborted (a late callback is kept for audit only)
    pub async fn cancel(&self, article_id: Uuid) -> Result<Article> {
        let article = self.require_article(article_id).await?;

        let moved = articles::transition_status(
            &self.db,
            article_id,
            &[ArticleStatus::Generating, ArticleStatus::Paused],
            ArticleStatus::Cancelled,
            None,
        )
        .await?;
        if !moved {
            return Err(Error::InvalidStateTransition(format!(
                "Article in status '{}' cannot be cancelled",
                article.status
            )));
        }

        tracing::info!(article_id = %article_id, "Article cancelled");
        self.bus.emit(DeskEvent::ArticleCancelled {
            id: article_id,
            title: article.title,
        });

        self.require_article(article_id).await
    }

    pub async fn pause(&self, article_id: Uuid) -> Result<Article> {
        let article = self.require_article(article_id).await?;

        let moved = articles::transition_status(
            &self.db,
            article_id,
            &[ArticleStatus::Generating],
            ArticleStatus::Paused,
            None,
        )
        .await?;
        if !moved {
            return Err(Error::InvalidStateTransition(format!(
                "Article in status '{}' cannot be paused",
                article.status
            )));
        }

        self.bus.emit(DeskEvent::ArticlePaused { id: article_id });
        self.require_article(article_id).await
    }

    /// Resume restores the deadline but does not re-trigger the engine; the
    /// original job may still call back
    pub async fn resume(&self, article_id: Uuid) -> Result<Article> {
        let article = self.require_article(article_id).await?;

        let moved = articles::transition_status(
            &self.db,
            article_id,
            &[ArticleStatus::Paused],
            ArticleStatus::Generating,
            Some(Utc::now() + self.retry_window()),
        )
        .await?;
        if !moved {
            return Err(Error::InvalidStateTransition(format!(
                "Article in status '{}' cannot be resumed",
                article.status
            )));
        }

        self.bus.emit(DeskEvent::ArticleResumed { id: article_id });
        self.require_article(article_id).await
    }

    /// Explicit retry from a stalled terminal state: counters reset, fresh
    /// deadline, re-issued trigger
    pub async fn retry(&self, article_id: Uuid) -> Result<Article> {
        let article = self.require_article(article_id).await?;

        let moved = articles::reset_for_retry(
            &self.db,
            article_id,
            &[
                ArticleStatus::Failed,
                ArticleStatus::Timeout,
                ArticleStatus::Cancelled,
            ],
            Utc::now() + self.retry_window(),
        )
        .await?;
        if !moved {
            return Err(Error::InvalidStateTransition(format!(
                "Article in status '{}' cannot be retried",
                article.status
            )));
        }

        self.engine
            .trigger_generation(
                article.id,
                article.trigger_kind,
                "",
                article.category.as_deref(),
                &article.languages,
                &[],
                None,
            )
            .await;

        tracing::info!(article_id = %article_id, "Article retried");
        self.bus.emit(DeskEvent::ArticleRetry {
            id: article_id,
            title: article.title,
            retry: 0,
        });

        self.require_article(article_id).await
    }

    /// Apply an engine callback.
    ///
    /// The delivered status is trusted as-is while the article is still in
    /// automated flow (generating/translating/review). On a settled article
    /// the payload is persisted for audit but the status stays put.
    pub async fn apply_callback(&self, payload: EngineCallback) -> Result<Article> {
        let article_id = payload.article_id;
        let article = self.require_article(article_id).await?;

        if let Some(title) = payload.title.as_deref() {
            articles::set_title(&self.db, article_id, title).await?;
        }

        let status_applied = articles::apply_callback_status(
            &self.db,
            article_id,
            payload.status,
            Utc::now() + self.retry_window(),
        )
        .await?;
        if !status_applied {
            tracing::info!(
                article_id = %article_id,
                current = article.status.as_str(),
                delivered = payload.status.as_str(),
                "Late callback on settled article, payload kept for audit only"
            );
        }

        // Content is created lazily on the first callback that carries any
        if payload.body.is_some() || payload.lead.is_some() {
            let patch = ContentPatch {
                title: payload.title.clone(),
                lead: payload.lead.clone(),
                body: payload.body.clone(),
                sources: payload.sources.clone(),
                seo_title: payload.seo_title.clone(),
                seo_description: payload.seo_description.clone(),
                image_prompt: payload.image_prompt.clone(),
            };
            contents::upsert_patch(&self.db, article_id, &article.title, &patch).await?;
        }

        if let Some(callback_translations) = &payload.translations {
            for (language, data) in callback_translations {
                translations::upsert(
                    &self.db,
                    article_id,
                    language,
                    &TranslationPatch {
                        title: data.title.clone(),
                        lead: data.lead.clone(),
                        body: data.body.clone(),
                        status: data.status,
                    },
                )
                .await?;
            }
        }

        if let Some(sv) = &payload.supervisor {
            supervisor::append_decision(
                &self.db,
                article_id,
                &NewDecision {
                    recommendation: sv.recommendation,
                    justification: sv.justification.clone(),
                    score: sv.score,
                    style_tags: sv.tags.clone(),
                },
            )
            .await?;
        }

        let updated = self.require_article(article_id).await?;
        self.bus.emit(DeskEvent::ArticleUpdated {
            id: updated.id,
            title: updated.title.clone(),
            status: updated.status.as_str().to_string(),
        });

        Ok(updated)
    }

    async fn require_article(&self, article_id: Uuid) -> Result<Article> {
        articles::get_article(&self.db, article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Article {}", article_id)))
    }

    /// Approval requests an embedding of the canonical content when none
    /// has been computed yet
    fn spawn_embedding_if_absent(&self, article_id: Uuid) {
        let db = self.db.clone();
        let llm = Arc::clone(&self.llm);

        tasks::spawn_logged("content-embedding", async move {
            let Some(content) = contents::get_by_article(&db, article_id).await? else {
                return Ok(());
            };
            if content.embedding.is_some() {
                return Ok(());
            }

            let text = build_embedding_text(
                &content.title,
                content.lead.as_deref(),
                content.body.as_deref(),
            );
            let vector = llm.embed(&text).await?;
            contents::set_embedding(&db, article_id, &vector).await
        });
    }
}

/// Working title derived from the request text
fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "New article".to_string();
    }
    trimmed.chars().take(120).collect()
}
