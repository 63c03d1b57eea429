//! Database initialization
//!
//! Creates the database on first run and brings existing databases up to
//! the current schema. All `create_*_table` calls are idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_tables(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_connection(&pool).await?;
    create_tables(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer; the pipelines write
    // from several tasks at once
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_articles_table(pool).await?;
    create_contents_table(pool).await?;
    create_translations_table(pool).await?;
    create_supervisor_decisions_table(pool).await?;
    create_tone_traits_table(pool).await?;
    create_topic_rankings_table(pool).await?;
    Ok(())
}

async fn create_articles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            trigger_kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'generating',
            category TEXT,
            languages TEXT NOT NULL DEFAULT '{}',
            context_urls TEXT NOT NULL DEFAULT '[]',
            content_hash TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            last_error TEXT,
            timeout_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_content_hash ON articles(content_hash)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_contents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id TEXT NOT NULL UNIQUE REFERENCES articles(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            lead TEXT,
            body TEXT,
            sources TEXT,
            seo_title TEXT,
            seo_description TEXT,
            image_url TEXT,
            image_prompt TEXT,
            embedding TEXT,
            cms_post_id INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_translations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            language TEXT NOT NULL,
            title TEXT,
            lead TEXT,
            body TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            cms_post_id INTEGER,
            created_at TEXT NOT NULL,
            UNIQUE(article_id, language)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_supervisor_decisions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS supervisor_decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
            recommendation TEXT NOT NULL,
            justification TEXT NOT NULL,
            score INTEGER NOT NULL,
            style_tags TEXT NOT NULL DEFAULT '[]',
            editor_decision TEXT,
            editor_feedback TEXT,
            deviation INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // "Latest decision" is resolved by this index, not insertion order
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_supervisor_decisions_article
         ON supervisor_decisions(article_id, created_at DESC, id DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tone_traits_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tone_traits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL UNIQUE,
            value TEXT,
            weight REAL NOT NULL DEFAULT 0.5,
            evidence INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_topic_rankings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_rankings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            category TEXT NOT NULL UNIQUE,
            article_count INTEGER NOT NULL DEFAULT 0,
            approval_rate REAL NOT NULL DEFAULT 0.0,
            last_article_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
