//! Tonality profile and topic ranking queries
//!
//! Weight arithmetic happens in SQL (MIN/MAX expressions) so concurrent
//! feedback applications never read-modify-write a stale value.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use copydesk_common::db::models::{ToneTrait, TopicRanking};
use copydesk_common::db::{parse_db_time, parse_db_time_opt, to_db_time};
use copydesk_common::Result;

/// Weight added for a tag confirmed by an editor approval
pub const REINFORCE_STEP: f64 = 0.02;
/// Weight removed from traits not seen in an approval
pub const DECAY_STEP: f64 = 0.005;
/// Weight bounds
pub const WEIGHT_MAX: f64 = 1.0;
pub const WEIGHT_MIN: f64 = 0.1;
/// Starting weight for a newly observed trait
pub const SEED_WEIGHT: f64 = 0.5;
/// Smoothing factor for the topic approval rate
pub const APPROVAL_SMOOTHING: f64 = 0.2;

fn trait_from_row(row: &SqliteRow) -> Result<ToneTrait> {
    let updated_at: String = row.get("updated_at");
    Ok(ToneTrait {
        id: row.get("id"),
        label: row.get("label"),
        value: row.get("value"),
        weight: row.get("weight"),
        evidence: row.get("evidence"),
        updated_at: parse_db_time(&updated_at)?,
    })
}

fn ranking_from_row(row: &SqliteRow) -> Result<TopicRanking> {
    let last_article_at: Option<String> = row.get("last_article_at");
    Ok(TopicRanking {
        id: row.get("id"),
        topic: row.get("topic"),
        category: row.get("category"),
        article_count: row.get("article_count"),
        approval_rate: row.get("approval_rate"),
        last_article_at: parse_db_time_opt(last_article_at)?,
    })
}

/// Tonality profile ordered by weight, heaviest first
pub async fn list_traits(pool: &SqlitePool) -> Result<Vec<ToneTrait>> {
    let rows = sqlx::query(
        "SELECT id, label, value, weight, evidence, updated_at
         FROM tone_traits ORDER BY weight DESC, label ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(trait_from_row).collect()
}

pub async fn get_trait(pool: &SqlitePool, id: i64) -> Result<Option<ToneTrait>> {
    let row = sqlx::query(
        "SELECT id, label, value, weight, evidence, updated_at FROM tone_traits WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(trait_from_row).transpose()
}

/// Manual profile management: set label/value/weight, keep evidence
pub async fn upsert_trait(
    pool: &SqlitePool,
    label: &str,
    value: &str,
    weight: f64,
) -> Result<()> {
    let weight = weight.clamp(WEIGHT_MIN, WEIGHT_MAX);
    sqlx::query(
        r#"
        INSERT INTO tone_traits (label, value, weight, evidence, updated_at)
        VALUES (?, ?, ?, 0, ?)
        ON CONFLICT(label) DO UPDATE SET
            value = excluded.value,
            weight = excluded.weight,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(label)
    .bind(value)
    .bind(weight)
    .bind(to_db_time(Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_trait(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tone_traits WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Reinforce one confirmed tag: bump weight (capped) and evidence.
/// A tag never seen before enters the profile at the seed weight.
pub async fn reinforce_trait(pool: &SqlitePool, label: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tone_traits (label, value, weight, evidence, updated_at)
        VALUES (?, 'confirmed by editor', ?, 1, ?)
        ON CONFLICT(label) DO UPDATE SET
            weight = MIN(?, tone_traits.weight + ?),
            evidence = tone_traits.evidence + 1,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(label)
    .bind(SEED_WEIGHT)
    .bind(to_db_time(Utc::now()))
    .bind(WEIGHT_MAX)
    .bind(REINFORCE_STEP)
    .execute(pool)
    .await?;

    Ok(())
}

/// Decay every known trait not in the confirmed set (floored)
pub async fn decay_traits_except(pool: &SqlitePool, confirmed: &[String]) -> Result<()> {
    let placeholders = confirmed.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = if confirmed.is_empty() {
        "UPDATE tone_traits SET weight = MAX(?, weight - ?), updated_at = ?".to_string()
    } else {
        format!(
            "UPDATE tone_traits SET weight = MAX(?, weight - ?), updated_at = ?
             WHERE label NOT IN ({})",
            placeholders
        )
    };

    let mut query = sqlx::query(&sql)
        .bind(WEIGHT_MIN)
        .bind(DECAY_STEP)
        .bind(to_db_time(Utc::now()));
    for label in confirmed {
        query = query.bind(label);
    }
    query.execute(pool).await?;

    Ok(())
}

/// Topic rankings ordered by article count
pub async fn list_rankings(pool: &SqlitePool) -> Result<Vec<TopicRanking>> {
    let rows = sqlx::query(
        "SELECT id, topic, category, article_count, approval_rate, last_article_at
         FROM topic_rankings ORDER BY article_count DESC, category ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(ranking_from_row).collect()
}

pub async fn get_ranking(pool: &SqlitePool, category: &str) -> Result<Option<TopicRanking>> {
    let row = sqlx::query(
        "SELECT id, topic, category, article_count, approval_rate, last_article_at
         FROM topic_rankings WHERE category = ?",
    )
    .bind(category)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(ranking_from_row).transpose()
}

/// Fold one editor decision into the category's running statistics.
///
/// The approval rate is an exponential moving average:
/// rate' = rate * (1 - a) + outcome * a, seeded at 0.0 for a new topic.
pub async fn update_ranking(
    pool: &SqlitePool,
    category: &str,
    approved: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let outcome = if approved { 1.0 } else { 0.0 };
    sqlx::query(
        r#"
        INSERT INTO topic_rankings (topic, category, article_count, approval_rate, last_article_at)
        VALUES (?, ?, 1, ?, ?)
        ON CONFLICT(category) DO UPDATE SET
            article_count = topic_rankings.article_count + 1,
            approval_rate = topic_rankings.approval_rate * (1.0 - ?) + ? * ?,
            last_article_at = excluded.last_article_at
        "#,
    )
    .bind(category)
    .bind(category)
    .bind(outcome * APPROVAL_SMOOTHING)
    .bind(to_db_time(now))
    .bind(APPROVAL_SMOOTHING)
    .bind(outcome)
    .bind(APPROVAL_SMOOTHING)
    .execute(pool)
    .await?;

    Ok(())
}
