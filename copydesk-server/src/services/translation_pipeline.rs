//! Translation orchestration
//!
//! Two stages per language: structural machine translation, then idiomatic
//! review. Languages run concurrently and independently; a provider failure
//! in one language never cancels the others. When every branch has finished
//! the article moves on to `review` — also when some branches failed, since
//! their rows simply keep their prior state.

use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use copydesk_common::db::models::{ArticleStatus, TranslationStatus};
use copydesk_common::events::{DeskEvent, EventBus};
use copydesk_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db::{articles, contents, translations};
use crate::db::translations::TranslationPatch;

use super::provider::{IdiomaticReviewer, SourceFields, StructuralTranslator};

pub struct TranslationPipeline {
    db: SqlitePool,
    bus: EventBus,
    translator: Arc<dyn StructuralTranslator>,
    reviewer: Arc<dyn IdiomaticReviewer>,
    source_language: String,
}

impl TranslationPipeline {
    pub fn new(
        db: SqlitePool,
        bus: EventBus,
        translator: Arc<dyn StructuralTranslator>,
        reviewer: Arc<dyn IdiomaticReviewer>,
        source_language: &str,
    ) -> Self {
        Self {
            db,
            bus,
            translator,
            reviewer,
            source_language: source_language.to_string(),
        }
    }

    /// Run the pipeline for an article.
    ///
    /// `languages` overrides the target set; the default is the article's
    /// enabled languages minus the source language.
    pub async fn run(&self, article_id: Uuid, languages: Option<Vec<String>>) -> Result<()> {
        let article = articles::get_article(&self.db, article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Article {}", article_id)))?;

        let content = contents::get_by_article(&self.db, article_id)
            .await?
            .filter(|c| c.body.as_deref().is_some_and(|b| !b.is_empty()))
            .ok_or_else(|| {
                Error::ContentNotReady(format!("Article {} has no canonical content", article_id))
            })?;

        let languages =
            languages.unwrap_or_else(|| article.target_languages(&self.source_language));

        let moved = articles::transition_status(
            &self.db,
            article_id,
            &[
                ArticleStatus::Generating,
                ArticleStatus::Translating,
                ArticleStatus::Review,
            ],
            ArticleStatus::Translating,
            None,
        )
        .await?;
        if !moved {
            return Err(Error::InvalidStateTransition(format!(
                "Article {} cannot start translating from status {}",
                article_id, article.status
            )));
        }
        self.bus.emit(DeskEvent::ArticleUpdated {
            id: article_id,
            title: article.title.clone(),
            status: ArticleStatus::Translating.as_str().to_string(),
        });

        let source = SourceFields {
            title: content.title.clone(),
            lead: content.lead.clone().unwrap_or_default(),
            body: content.body.clone().unwrap_or_default(),
        };

        let mut branches = JoinSet::new();
        for language in languages {
            let db = self.db.clone();
            let bus = self.bus.clone();
            let translator = Arc::clone(&self.translator);
            let reviewer = Arc::clone(&self.reviewer);
            let source = source.clone();

            branches.spawn(async move {
                let result = translate_language(
                    &db, &bus, translator, reviewer, article_id, &source, &language,
                )
                .await;
                (language, result)
            });
        }

        // Gather with isolation: a failed branch is logged, never fatal
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((language, Ok(()))) => {
                    tracing::debug!(article_id = %article_id, language = %language, "Language branch finished");
                }
                Ok((language, Err(e))) => {
                    tracing::warn!(
                        article_id = %article_id,
                        language = %language,
                        error = %e,
                        "Language branch failed"
                    );
                }
                Err(e) => {
                    tracing::error!(article_id = %article_id, error = %e, "Language branch panicked");
                }
            }
        }

        // All branches done; hand over to the editor unless something else
        // moved the article meanwhile
        let reached_review = articles::transition_status(
            &self.db,
            article_id,
            &[ArticleStatus::Translating],
            ArticleStatus::Review,
            None,
        )
        .await?;

        if reached_review {
            self.bus.emit(DeskEvent::ArticleUpdated {
                id: article_id,
                title: article.title,
                status: ArticleStatus::Review.as_str().to_string(),
            });
        }

        Ok(())
    }
}

/// One language's two-stage branch. Every DB write is its own short
/// statement so a stuck provider in another branch cannot block it.
async fn translate_language(
    db: &SqlitePool,
    bus: &EventBus,
    translator: Arc<dyn StructuralTranslator>,
    reviewer: Arc<dyn IdiomaticReviewer>,
    article_id: Uuid,
    source: &SourceFields,
    language: &str,
) -> Result<()> {
    // Stage 1: structural translation
    let translated = translator.translate_fields(source, language).await?;
    if translated.is_empty() {
        return Err(Error::ExternalFailure(format!(
            "Translator produced no fields for '{}'",
            language
        )));
    }

    translations::upsert(
        db,
        article_id,
        language,
        &TranslationPatch {
            title: translated.title.clone(),
            lead: translated.lead.clone(),
            body: translated.body.clone(),
            status: Some(TranslationStatus::MachineTranslated),
        },
    )
    .await?;

    bus.emit(DeskEvent::TranslationUpdated {
        article_id,
        language: language.to_string(),
        status: TranslationStatus::MachineTranslated.as_str().to_string(),
    });

    // Stage 2: idiomatic review, only meaningful with a translated body
    if translated.body.is_none() {
        return Ok(());
    }

    let reviewed = reviewer.review_fields(source, &translated, language).await?;

    translations::upsert(
        db,
        article_id,
        language,
        &TranslationPatch {
            title: reviewed.title,
            lead: reviewed.lead,
            body: reviewed.body,
            status: Some(TranslationStatus::Reviewed),
        },
    )
    .await?;

    bus.emit(DeskEvent::TranslationUpdated {
        article_id,
        language: language.to_string(),
        status: TranslationStatus::Reviewed.as_str().to_string(),
    });

    Ok(())
}
