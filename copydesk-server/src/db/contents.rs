//! Canonical content queries

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use copydesk_common::db::models::Content;
use copydesk_common::db::{parse_db_time, parse_db_uuid, to_db_time};
use copydesk_common::{Error, Result};

/// Partial content update from the engine callback.
///
/// Absent fields leave the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct ContentPatch {
    pub title: Option<String>,
    pub lead: Option<String>,
    pub body: Option<String>,
    pub sources: Option<serde_json::Value>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub image_prompt: Option<String>,
}

impl ContentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.lead.is_none()
            && self.body.is_none()
            && self.sources.is_none()
            && self.seo_title.is_none()
            && self.seo_description.is_none()
            && self.image_prompt.is_none()
    }
}

fn content_from_row(row: &SqliteRow) -> Result<Content> {
    let article_id: String = row.get("article_id");
    let sources: Option<String> = row.get("sources");
    let embedding: Option<String> = row.get("embedding");
    let created_at: String = row.get("created_at");

    Ok(Content {
        id: row.get("id"),
        article_id: parse_db_uuid(&article_id)?,
        title: row.get("title"),
        lead: row.get("lead"),
        body: row.get("body"),
        sources: sources
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to parse sources: {}", e)))?,
        seo_title: row.get("seo_title"),
        seo_description: row.get("seo_description"),
        image_url: row.get("image_url"),
        image_prompt: row.get("image_prompt"),
        embedding: embedding
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to parse embedding: {}", e)))?,
        cms_post_id: row.get("cms_post_id"),
        created_at: parse_db_time(&created_at)?,
    })
}

pub async fn get_by_article(pool: &SqlitePool, article_id: Uuid) -> Result<Option<Content>> {
    let row = sqlx::query(
        "SELECT id, article_id, title, lead, body, sources, seo_title, seo_description,
                image_url, image_prompt, embedding, cms_post_id, created_at
         FROM contents WHERE article_id = ?",
    )
    .bind(article_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(content_from_row).transpose()
}

/// Create the content row lazily on first patch, then merge later patches
/// field by field
pub async fn upsert_patch(
    pool: &SqlitePool,
    article_id: Uuid,
    fallback_title: &str,
    patch: &ContentPatch,
) -> Result<()> {
    let sources = patch
        .sources
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize sources: {}", e)))?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM contents WHERE article_id = ?)")
            .bind(article_id.to_string())
            .fetch_one(pool)
            .await?;

    if exists {
        sqlx::query(
            r#"
            UPDATE contents SET
                title = COALESCE(?, title),
                lead = COALESCE(?, lead),
                body = COALESCE(?, body),
                sources = COALESCE(?, sources),
                seo_title = COALESCE(?, seo_title),
                seo_description = COALESCE(?, seo_description),
                image_prompt = COALESCE(?, image_prompt)
            WHERE article_id = ?
            "#,
        )
        .bind(&patch.title)
        .bind(&patch.lead)
        .bind(&patch.body)
        .bind(&sources)
        .bind(&patch.seo_title)
        .bind(&patch.seo_description)
        .bind(&patch.image_prompt)
        .bind(article_id.to_string())
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            r#"
            INSERT INTO contents (
                article_id, title, lead, body, sources, seo_title,
                seo_description, image_prompt, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(article_id.to_string())
        .bind(patch.title.as_deref().unwrap_or(fallback_title))
        .bind(&patch.lead)
        .bind(&patch.body)
        .bind(&sources)
        .bind(&patch.seo_title)
        .bind(&patch.seo_description)
        .bind(&patch.image_prompt)
        .bind(to_db_time(Utc::now()))
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn set_image(
    pool: &SqlitePool,
    article_id: Uuid,
    image_url: &str,
    image_prompt: &str,
) -> Result<()> {
    sqlx::query("UPDATE contents SET image_url = ?, image_prompt = ? WHERE article_id = ?")
        .bind(image_url)
        .bind(image_prompt)
        .bind(article_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_embedding(pool: &SqlitePool, article_id: Uuid, embedding: &[f32]) -> Result<()> {
    let encoded = serde_json::to_string(embedding)
        .map_err(|e| Error::Internal(format!("Failed to serialize embedding: {}", e)))?;
    sqlx::query("UPDATE contents SET embedding = ? WHERE article_id = ?")
        .bind(encoded)
        .bind(article_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_cms_post_id(pool: &SqlitePool, article_id: Uuid, cms_post_id: i64) -> Result<()> {
    sqlx::query("UPDATE contents SET cms_post_id = ? WHERE article_id = ?")
        .bind(cms_post_id)
        .bind(article_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
