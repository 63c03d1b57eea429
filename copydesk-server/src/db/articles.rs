//! Article queries
//!
//! Status changes go through guarded UPDATE statements that check the
//! current status in the WHERE clause. A transition whose guard does not
//! match affects zero rows and reports `false`; that is what serializes
//! concurrent transitions on a single article.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use copydesk_common::db::models::{Article, ArticleStatus, TriggerKind};
use copydesk_common::db::{parse_db_time, parse_db_time_opt, parse_db_uuid, to_db_time};
use copydesk_common::{Error, Result};

const ARTICLE_COLUMNS: &str = "id, title, trigger_kind, status, category, languages, \
     context_urls, content_hash, retry_count, max_retries, last_error, \
     timeout_at, created_at, updated_at";

/// Fields for a new article row
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub id: Uuid,
    pub title: String,
    pub trigger_kind: TriggerKind,
    pub category: Option<String>,
    pub languages: BTreeMap<String, bool>,
    pub context_urls: Vec<String>,
    pub content_hash: String,
    pub max_retries: i64,
    pub timeout_at: DateTime<Utc>,
}

pub(crate) fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let id: String = row.get("id");
    let trigger_kind: String = row.get("trigger_kind");
    let status: String = row.get("status");
    let languages: String = row.get("languages");
    let context_urls: String = row.get("context_urls");
    let timeout_at: Option<String> = row.get("timeout_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Article {
        id: parse_db_uuid(&id)?,
        title: row.get("title"),
        trigger_kind: trigger_kind.parse()?,
        status: status.parse()?,
        category: row.get("category"),
        languages: serde_json::from_str(&languages)
            .map_err(|e| Error::Internal(format!("Failed to parse languages: {}", e)))?,
        context_urls: serde_json::from_str(&context_urls)
            .map_err(|e| Error::Internal(format!("Failed to parse context_urls: {}", e)))?,
        content_hash: row.get("content_hash"),
        retry_count: row.get("retry_count"),
        max_retries: row.get("max_retries"),
        last_error: row.get("last_error"),
        timeout_at: parse_db_time_opt(timeout_at)?,
        created_at: parse_db_time(&created_at)?,
        updated_at: parse_db_time(&updated_at)?,
    })
}

/// Render a status guard as a SQL IN list (values are static identifiers)
fn status_in_list(statuses: &[ArticleStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn insert_article(pool: &SqlitePool, new: &NewArticle) -> Result<Article> {
    let now = to_db_time(Utc::now());
    let languages = serde_json::to_string(&new.languages)
        .map_err(|e| Error::Internal(format!("Failed to serialize languages: {}", e)))?;
    let context_urls = serde_json::to_string(&new.context_urls)
        .map_err(|e| Error::Internal(format!("Failed to serialize context_urls: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO articles (
            id, title, trigger_kind, status, category, languages, context_urls,
            content_hash, retry_count, max_retries, last_error, timeout_at,
            created_at, updated_at
        ) VALUES (?, ?, ?, 'generating', ?, ?, ?, ?, 0, ?, NULL, ?, ?, ?)
        "#,
    )
    .bind(new.id.to_string())
    .bind(&new.title)
    .bind(new.trigger_kind.as_str())
    .bind(&new.category)
    .bind(languages)
    .bind(context_urls)
    .bind(&new.content_hash)
    .bind(new.max_retries)
    .bind(to_db_time(new.timeout_at))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_article(pool, new.id)
        .await?
        .ok_or_else(|| Error::Internal("Inserted article not found".to_string()))
}

pub async fn get_article(pool: &SqlitePool, id: Uuid) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE id = ?", ARTICLE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(article_from_row).transpose()
}

pub async fn list_articles(
    pool: &SqlitePool,
    status: Option<ArticleStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Article>> {
    let rows = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {} FROM articles WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                ARTICLE_COLUMNS
            );
            sqlx::query(&sql)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM articles ORDER BY created_at DESC LIMIT ? OFFSET ?",
                ARTICLE_COLUMNS
            );
            sqlx::query(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(article_from_row).collect()
}

/// Article counts per status
pub async fn status_counts(pool: &SqlitePool) -> Result<BTreeMap<String, i64>> {
    let rows = sqlx::query("SELECT status, COUNT(id) AS n FROM articles GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut counts = BTreeMap::new();
    for row in rows {
        counts.insert(row.get::<String, _>("status"), row.get::<i64, _>("n"));
    }
    Ok(counts)
}

/// Find an article with the given fingerprint whose status still blocks
/// resubmission (anything outside the terminal-failure set)
pub async fn find_active_by_hash(pool: &SqlitePool, content_hash: &str) -> Result<Option<Uuid>> {
    let row = sqlx::query(
        "SELECT id FROM articles
         WHERE content_hash = ? AND status NOT IN ('failed', 'cancelled')
         LIMIT 1",
    )
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let id: String = row.get("id");
            Ok(Some(parse_db_uuid(&id)?))
        }
        None => Ok(None),
    }
}

/// Guarded status transition. Returns false when the guard did not match.
///
/// `timeout_at` is written unconditionally: the deadline invariant (set iff
/// generating) is the caller's responsibility.
pub async fn transition_status(
    pool: &SqlitePool,
    id: Uuid,
    allowed_from: &[ArticleStatus],
    to: ArticleStatus,
    timeout_at: Option<DateTime<Utc>>,
) -> Result<bool> {
    let sql = format!(
        "UPDATE articles SET status = ?, timeout_at = ?, updated_at = ?
         WHERE id = ? AND status IN ({})",
        status_in_list(allowed_from)
    );
    let result = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(timeout_at.map(to_db_time))
        .bind(to_db_time(Utc::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Retry from a stalled terminal state: back to generating with counters reset
pub async fn reset_for_retry(
    pool: &SqlitePool,
    id: Uuid,
    allowed_from: &[ArticleStatus],
    deadline: DateTime<Utc>,
) -> Result<bool> {
    let sql = format!(
        "UPDATE articles
         SET status = 'generating', retry_count = 0, last_error = NULL,
             timeout_at = ?, updated_at = ?
         WHERE id = ? AND status IN ({})",
        status_in_list(allowed_from)
    );
    let result = sqlx::query(&sql)
        .bind(to_db_time(deadline))
        .bind(to_db_time(Utc::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Apply a status delivered by the engine callback.
///
/// Only articles still in automated flow accept it; settled articles keep
/// their status (the callback data itself is persisted separately for
/// audit). Entering `generating` keeps an existing deadline or starts a
/// fresh one; every other status clears it.
pub async fn apply_callback_status(
    pool: &SqlitePool,
    id: Uuid,
    to: ArticleStatus,
    fallback_deadline: DateTime<Utc>,
) -> Result<bool> {
    let result = if to == ArticleStatus::Generating {
        sqlx::query(
            "UPDATE articles
             SET status = 'generating', timeout_at = COALESCE(timeout_at, ?), updated_at = ?
             WHERE id = ? AND status IN ('generating', 'translating', 'review')",
        )
        .bind(to_db_time(fallback_deadline))
        .bind(to_db_time(Utc::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?
    } else {
        sqlx::query(
            "UPDATE articles SET status = ?, timeout_at = NULL, updated_at = ?
             WHERE id = ? AND status IN ('generating', 'translating', 'review')",
        )
        .bind(to.as_str())
        .bind(to_db_time(Utc::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?
    };

    Ok(result.rows_affected() == 1)
}

pub async fn set_title(pool: &SqlitePool, id: Uuid, title: &str) -> Result<()> {
    sqlx::query("UPDATE articles SET title = ?, updated_at = ? WHERE id = ?")
        .bind(title)
        .bind(to_db_time(Utc::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Articles whose generation deadline has passed
pub async fn expired_generating(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Article>> {
    let sql = format!(
        "SELECT {} FROM articles
         WHERE status = 'generating' AND timeout_at IS NOT NULL AND timeout_at < ?
         ORDER BY timeout_at ASC",
        ARTICLE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(to_db_time(now))
        .fetch_all(pool)
        .await?;

    rows.iter().map(article_from_row).collect()
}

/// Watchdog retry bookkeeping. Guarded on `generating` so a transition that
/// raced the sweep wins.
pub async fn record_retry(
    conn: &mut SqliteConnection,
    id: Uuid,
    retry_count: i64,
    last_error: &str,
    deadline: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE articles
         SET retry_count = ?, last_error = ?, timeout_at = ?, updated_at = ?
         WHERE id = ? AND status = 'generating' AND retry_count < max_retries",
    )
    .bind(retry_count)
    .bind(last_error)
    .bind(to_db_time(deadline))
    .bind(to_db_time(Utc::now()))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Watchdog exhaustion. The guard makes the generating→timeout transition
/// fire exactly once per stall.
pub async fn mark_timeout(
    conn: &mut SqliteConnection,
    id: Uuid,
    last_error: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE articles
         SET status = 'timeout', last_error = ?, timeout_at = NULL, updated_at = ?
         WHERE id = ? AND status = 'generating' AND retry_count >= max_retries",
    )
    .bind(last_error)
    .bind(to_db_time(Utc::now()))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
