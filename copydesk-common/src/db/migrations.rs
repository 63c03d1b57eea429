//! Database schema migrations
//!
//! Versioned migrations on top of the idempotent CREATE TABLE baseline.
//! Never modify an existing migration; add a new one and bump
//! CURRENT_SCHEMA_VERSION.

use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 1;

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM schema_version").execute(pool).await?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await?;

    let version = get_schema_version(pool).await?;

    if version < CURRENT_SCHEMA_VERSION {
        info!(
            "Migrating database schema from v{} to v{}",
            version, CURRENT_SCHEMA_VERSION
        );
        // v1 is the baseline created by init; future ALTER TABLE migrations
        // slot in here, guarded by `if version < N`
        set_schema_version(pool, CURRENT_SCHEMA_VERSION).await?;
    }

    Ok(())
}
