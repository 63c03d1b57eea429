//! Database access for Copydesk
//!
//! Schema initialization lives here; per-entity queries live in the
//! service crate next to the code that uses them.

pub mod init;
pub mod migrations;
pub mod models;

pub use init::init_database;

use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Format a timestamp for TEXT storage
pub fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a TEXT-stored timestamp
pub fn parse_db_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", raw, e)))
}

/// Parse an optional TEXT-stored timestamp
pub fn parse_db_time_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_db_time).transpose()
}

/// Parse a TEXT-stored UUID
pub fn parse_db_uuid(raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw)
        .map_err(|e| Error::Internal(format!("Failed to parse uuid '{}': {}", raw, e)))
}
