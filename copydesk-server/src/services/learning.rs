//! Learning feedback engine
//!
//! Folds editor decisions back into the system: annotates the latest
//! supervisor decision, reinforces/decays the tonality profile, and updates
//! the per-category approval statistics.

use chrono::Utc;
use serde::Serialize;

use copydesk_common::db::models::{Article, Recommendation};
use copydesk_common::Result;
use sqlx::SqlitePool;

use crate::db::{profile, supervisor};

/// Derived deviation statistics for the supervisor dashboard
#[derive(Debug, Clone, Serialize)]
pub struct DeviationStats {
    pub total_decisions: i64,
    pub deviations: i64,
    /// Percentage of editor-decided evaluations where the editor disagreed
    pub deviation_rate: f64,
}

/// Apply an editor decision to the learning systems.
///
/// 1. Attach decision + feedback to the latest supervisor decision and flag
///    a deviation when the automated recommendation disagreed.
/// 2. On approval, reinforce the decision's style tags (+0.02, capped) and
///    decay every other known trait (−0.005, floored).
/// 3. Fold the outcome into the article's topic ranking.
///
/// An article without a supervisor decision only updates the topic ranking;
/// there is nothing to attach to and no deviation to record.
pub async fn apply_editor_decision(
    pool: &SqlitePool,
    article: &Article,
    decision: Recommendation,
    feedback: Option<&str>,
) -> Result<()> {
    if let Some(latest) = supervisor::latest_for_article(pool, article.id).await? {
        let deviation = latest.recommendation != decision;
        supervisor::attach_editor_decision(pool, latest.id, decision, feedback, deviation).await?;

        if decision == Recommendation::Approve && !latest.style_tags.is_empty() {
            reinforce_profile(pool, &latest.style_tags).await?;
        }

        tracing::debug!(
            article_id = %article.id,
            decision = decision.as_str(),
            deviation,
            "Editor decision attached to supervisor decision {}",
            latest.id
        );
    }

    if let Some(category) = article.category.as_deref() {
        profile::update_ranking(pool, category, decision == Recommendation::Approve, Utc::now())
            .await?;
    }

    Ok(())
}

/// Reinforce confirmed style tags and let unconfirmed traits fade
async fn reinforce_profile(pool: &SqlitePool, tags: &[String]) -> Result<()> {
    for tag in tags {
        profile::reinforce_trait(pool, tag).await?;
    }
    profile::decay_traits_except(pool, tags).await?;
    Ok(())
}

/// Deviation statistics, derived from the decision history on demand
pub async fn deviation_stats(pool: &SqlitePool) -> Result<DeviationStats> {
    let (total_decisions, deviations) = supervisor::deviation_counts(pool).await?;

    let deviation_rate = if total_decisions > 0 {
        deviations as f64 / total_decisions as f64 * 100.0
    } else {
        0.0
    };

    Ok(DeviationStats {
        total_decisions,
        deviations,
        deviation_rate,
    })
}
