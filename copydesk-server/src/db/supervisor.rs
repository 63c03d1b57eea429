//! Supervisor decision queries
//!
//! Decisions are append-only. The only mutation ever applied after creation
//! is attaching the editor's decision fields.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use copydesk_common::db::models::{Recommendation, SupervisorDecision};
use copydesk_common::db::{parse_db_time, parse_db_uuid, to_db_time};
use copydesk_common::{Error, Result};

const DECISION_COLUMNS: &str = "id, article_id, recommendation, justification, score, \
     style_tags, editor_decision, editor_feedback, deviation, created_at";

/// Fields of a freshly appended decision
#[derive(Debug, Clone)]
pub struct NewDecision {
    pub recommendation: Recommendation,
    pub justification: String,
    pub score: i64,
    pub style_tags: Vec<String>,
}

fn decision_from_row(row: &SqliteRow) -> Result<SupervisorDecision> {
    let article_id: String = row.get("article_id");
    let recommendation: String = row.get("recommendation");
    let style_tags: String = row.get("style_tags");
    let editor_decision: Option<String> = row.get("editor_decision");
    let created_at: String = row.get("created_at");

    Ok(SupervisorDecision {
        id: row.get("id"),
        article_id: parse_db_uuid(&article_id)?,
        recommendation: recommendation.parse()?,
        justification: row.get("justification"),
        score: row.get("score"),
        style_tags: serde_json::from_str(&style_tags)
            .map_err(|e| Error::Internal(format!("Failed to parse style_tags: {}", e)))?,
        editor_decision: editor_decision.as_deref().map(str::parse).transpose()?,
        editor_feedback: row.get("editor_feedback"),
        deviation: row.get::<i64, _>("deviation") != 0,
        created_at: parse_db_time(&created_at)?,
    })
}

pub async fn append_decision(
    pool: &SqlitePool,
    article_id: Uuid,
    decision: &NewDecision,
) -> Result<i64> {
    let style_tags = serde_json::to_string(&decision.style_tags)
        .map_err(|e| Error::Internal(format!("Failed to serialize style_tags: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO supervisor_decisions (
            article_id, recommendation, justification, score, style_tags,
            editor_decision, editor_feedback, deviation, created_at
        ) VALUES (?, ?, ?, ?, ?, NULL, NULL, 0, ?)
        "#,
    )
    .bind(article_id.to_string())
    .bind(decision.recommendation.as_str())
    .bind(&decision.justification)
    .bind(decision.score)
    .bind(style_tags)
    .bind(to_db_time(Utc::now()))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// The current decision for UI/feedback purposes: most recent by creation
pub async fn latest_for_article(
    pool: &SqlitePool,
    article_id: Uuid,
) -> Result<Option<SupervisorDecision>> {
    let sql = format!(
        "SELECT {} FROM supervisor_decisions
         WHERE article_id = ?
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
        DECISION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(article_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(decision_from_row).transpose()
}

pub async fn list_decisions(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<SupervisorDecision>> {
    let sql = format!(
        "SELECT {} FROM supervisor_decisions
         ORDER BY created_at DESC, id DESC
         LIMIT ? OFFSET ?",
        DECISION_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(decision_from_row).collect()
}

/// Attach the editor's call to an existing decision
pub async fn attach_editor_decision(
    pool: &SqlitePool,
    decision_id: i64,
    editor_decision: Recommendation,
    editor_feedback: Option<&str>,
    deviation: bool,
) -> Result<()> {
    sqlx::query(
        "UPDATE supervisor_decisions
         SET editor_decision = ?, editor_feedback = ?, deviation = ?
         WHERE id = ?",
    )
    .bind(editor_decision.as_str())
    .bind(editor_feedback)
    .bind(deviation as i64)
    .bind(decision_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// (decisions with editor input, deviations among them)
pub async fn deviation_counts(pool: &SqlitePool) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT
             COUNT(CASE WHEN editor_decision IS NOT NULL THEN 1 END) AS total,
             COUNT(CASE WHEN deviation != 0 THEN 1 END) AS deviations
         FROM supervisor_decisions",
    )
    .fetch_one(pool)
    .await?;

    Ok((row.get("total"), row.get("deviations")))
}
