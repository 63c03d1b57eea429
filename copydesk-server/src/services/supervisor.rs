//! Supervisor evaluation coordination
//!
//! Loads the canonical content and the current tonality profile, invokes
//! the scoring service, and appends an immutable decision record. A failed
//! evaluation persists nothing.

use std::sync::Arc;
use uuid::Uuid;

use copydesk_common::db::models::{SupervisorDecision, ToneTrait};
use copydesk_common::events::{DeskEvent, EventBus};
use copydesk_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db::{articles, contents, profile, supervisor};
use crate::db::supervisor::NewDecision;

use super::provider::{QualityEvaluator, SourceFields};

pub struct SupervisorCoordinator {
    db: SqlitePool,
    bus: EventBus,
    evaluator: Arc<dyn QualityEvaluator>,
}

impl SupervisorCoordinator {
    pub fn new(db: SqlitePool, bus: EventBus, evaluator: Arc<dyn QualityEvaluator>) -> Self {
        Self { db, bus, evaluator }
    }

    /// Evaluate an article and append the decision
    pub async fn evaluate(&self, article_id: Uuid) -> Result<SupervisorDecision> {
        let article = articles::get_article(&self.db, article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Article {}", article_id)))?;

        let content = contents::get_by_article(&self.db, article_id)
            .await?
            .filter(|c| c.body.as_deref().is_some_and(|b| !b.is_empty()))
            .ok_or_else(|| {
                Error::ContentNotReady(format!("Article {} has no canonical content", article_id))
            })?;

        let traits = profile::list_traits(&self.db).await?;
        let tonality_profile = build_tonality_context(&traits);

        let source = SourceFields {
            title: content.title,
            lead: content.lead.unwrap_or_default(),
            body: content.body.unwrap_or_default(),
        };

        // Provider failure propagates here; no partial record is written
        let evaluation = self
            .evaluator
            .evaluate(&source, article.category.as_deref(), &tonality_profile)
            .await?;

        let decision = NewDecision {
            recommendation: evaluation.recommendation,
            justification: evaluation.justification,
            score: evaluation.score,
            style_tags: evaluation.style_tags,
        };
        supervisor::append_decision(&self.db, article_id, &decision).await?;

        tracing::info!(
            article_id = %article_id,
            score = decision.score,
            recommendation = decision.recommendation.as_str(),
            "Supervisor evaluation recorded"
        );
        self.bus.emit(DeskEvent::SupervisorEvaluated {
            article_id,
            score: decision.score,
            recommendation: decision.recommendation.as_str().to_string(),
        });

        supervisor::latest_for_article(&self.db, article_id)
            .await?
            .ok_or_else(|| Error::Internal("Appended decision not found".to_string()))
    }
}

/// Render the tonality profile for the evaluation prompt, heaviest
/// traits first
pub fn build_tonality_context(traits: &[ToneTrait]) -> String {
    if traits.is_empty() {
        return "No profile defined yet. Use defaults: factual, informative, accessible."
            .to_string();
    }

    traits
        .iter()
        .map(|t| {
            format!(
                "- {}: {} (weight: {:.1}, evidence: {})",
                t.label,
                t.value.as_deref().unwrap_or(""),
                t.weight,
                t.evidence
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_profile_renders_defaults() {
        let context = build_tonality_context(&[]);
        assert!(context.contains("No profile defined yet"));
    }

    #[test]
    fn profile_lines_carry_weight_and_evidence() {
        let traits = vec![ToneTrait {
            id: 1,
            label: "factual".to_string(),
            value: Some("confirmed by editor".to_string()),
            weight: 0.74,
            evidence: 12,
            updated_at: Utc::now(),
        }];
        let context = build_tonality_context(&traits);
        assert!(context.contains("- factual: confirmed by editor (weight: 0.7, evidence: 12)"));
    }
}
