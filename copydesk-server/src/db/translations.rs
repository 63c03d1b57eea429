//! Translation queries
//!
//! One row per (article, language), upserted by the translation pipeline
//! and the engine callback.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use copydesk_common::db::models::{Translation, TranslationStatus};
use copydesk_common::db::{parse_db_time, parse_db_uuid, to_db_time};
use copydesk_common::Result;

/// Partial translation update. Absent fields leave stored values unchanged.
#[derive(Debug, Clone, Default)]
pub struct TranslationPatch {
    pub title: Option<String>,
    pub lead: Option<String>,
    pub body: Option<String>,
    pub status: Option<TranslationStatus>,
}

fn translation_from_row(row: &SqliteRow) -> Result<Translation> {
    let article_id: String = row.get("article_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(Translation {
        id: row.get("id"),
        article_id: parse_db_uuid(&article_id)?,
        language: row.get("language"),
        title: row.get("title"),
        lead: row.get("lead"),
        body: row.get("body"),
        status: status.parse()?,
        cms_post_id: row.get("cms_post_id"),
        created_at: parse_db_time(&created_at)?,
    })
}

pub async fn list_for_article(pool: &SqlitePool, article_id: Uuid) -> Result<Vec<Translation>> {
    let rows = sqlx::query(
        "SELECT id, article_id, language, title, lead, body, status, cms_post_id, created_at
         FROM translations WHERE article_id = ? ORDER BY language ASC",
    )
    .bind(article_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(translation_from_row).collect()
}

pub async fn get(
    pool: &SqlitePool,
    article_id: Uuid,
    language: &str,
) -> Result<Option<Translation>> {
    let row = sqlx::query(
        "SELECT id, article_id, language, title, lead, body, status, cms_post_id, created_at
         FROM translations WHERE article_id = ? AND language = ?",
    )
    .bind(article_id.to_string())
    .bind(language)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(translation_from_row).transpose()
}

/// Insert or merge the row for (article, language)
pub async fn upsert(
    pool: &SqlitePool,
    article_id: Uuid,
    language: &str,
    patch: &TranslationPatch,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO translations (article_id, language, title, lead, body, status, created_at)
        VALUES (?, ?, ?, ?, ?, COALESCE(?, 'pending'), ?)
        ON CONFLICT(article_id, language) DO UPDATE SET
            title = COALESCE(excluded.title, translations.title),
            lead = COALESCE(excluded.lead, translations.lead),
            body = COALESCE(excluded.body, translations.body),
            status = CASE WHEN ? IS NULL THEN translations.status ELSE excluded.status END
        "#,
    )
    .bind(article_id.to_string())
    .bind(language)
    .bind(&patch.title)
    .bind(&patch.lead)
    .bind(&patch.body)
    .bind(patch.status.map(|s| s.as_str()))
    .bind(to_db_time(Utc::now()))
    .bind(patch.status.map(|s| s.as_str()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_cms_post_id(
    pool: &SqlitePool,
    article_id: Uuid,
    language: &str,
    cms_post_id: i64,
) -> Result<()> {
    sqlx::query("UPDATE translations SET cms_post_id = ? WHERE article_id = ? AND language = ?")
        .bind(cms_post_id)
        .bind(article_id.to_string())
        .bind(language)
        .execute(pool)
        .await?;
    Ok(())
}
