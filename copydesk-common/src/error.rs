//! Common error types for Copydesk

use thiserror::Error;
use uuid::Uuid;

/// Common result type for Copydesk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Copydesk pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested article/translation/profile entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Action not permitted from the article's current status
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Creation request fingerprint collides with an active article
    #[error("Duplicate content: matches active article {existing_id}")]
    DuplicateContent { existing_id: Uuid },

    /// Pipeline invoked before canonical content exists
    #[error("Content not ready: {0}")]
    ContentNotReady(String),

    /// No reachable provider/backend for an external call
    #[error("External service unavailable: {0}")]
    ExternalUnavailable(String),

    /// Provider reachable but returned an error or malformed result
    #[error("External service failure: {0}")]
    ExternalFailure(String),

    /// Bounded wait exceeded
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
