//! Event types for the Copydesk event system
//!
//! Provides shared event definitions and the EventBus used by the service
//! and its SSE subscribers. Events carry the article id plus the minimal
//! changed fields; heavyweight payloads stay in the database.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle events broadcast on every state change
///
/// Serialized wire shape is `{"event": "<name>", "data": {...}}`, matching
/// what SSE/WebSocket subscribers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum DeskEvent {
    /// New article record created, generation requested
    #[serde(rename = "article:created")]
    ArticleCreated {
        id: Uuid,
        title: String,
        status: String,
    },

    /// Status or content changed (callback, generic update)
    #[serde(rename = "article:updated")]
    ArticleUpdated {
        id: Uuid,
        title: String,
        status: String,
    },

    /// Editor approved the article
    #[serde(rename = "article:approved")]
    ArticleApproved { id: Uuid, title: String },

    /// Editor sent the article back for another generation pass
    #[serde(rename = "article:revised")]
    ArticleRevised { id: Uuid, title: String },

    /// Article cancelled by the editor
    #[serde(rename = "article:cancelled")]
    ArticleCancelled { id: Uuid, title: String },

    /// Article paused
    #[serde(rename = "article:paused")]
    ArticlePaused { id: Uuid },

    /// Paused article resumed
    #[serde(rename = "article:resumed")]
    ArticleResumed { id: Uuid },

    /// Watchdog re-issued a stalled generation attempt
    #[serde(rename = "article:retry")]
    ArticleRetry {
        id: Uuid,
        title: String,
        retry: i64,
    },

    /// Generation retries exhausted
    #[serde(rename = "article:timeout")]
    ArticleTimeout { id: Uuid, title: String },

    /// A per-language translation row changed status
    #[serde(rename = "translation:updated")]
    TranslationUpdated {
        article_id: Uuid,
        language: String,
        status: String,
    },

    /// Image pipeline started
    #[serde(rename = "image:generating")]
    ImageGenerating { article_id: Uuid },

    /// Image persisted and recorded on the content
    #[serde(rename = "image:ready")]
    ImageReady { article_id: Uuid, image_url: String },

    /// All image backends exhausted
    #[serde(rename = "image:failed")]
    ImageFailed { article_id: Uuid },

    /// Automated quality evaluation appended
    #[serde(rename = "supervisor:evaluated")]
    SupervisorEvaluated {
        article_id: Uuid,
        score: i64,
        recommendation: String,
    },

    /// Article (and approved translations) pushed to the CMS
    #[serde(rename = "publish:complete")]
    PublishComplete {
        article_id: Uuid,
        cms_post_id: i64,
    },
}

impl DeskEvent {
    /// Wire name of the event, used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            DeskEvent::ArticleCreated { .. } => "article:created",
            DeskEvent::ArticleUpdated { .. } => "article:updated",
            DeskEvent::ArticleApproved { .. } => "article:approved",
            DeskEvent::ArticleRevised { .. } => "article:revised",
            DeskEvent::ArticleCancelled { .. } => "article:cancelled",
            DeskEvent::ArticlePaused { .. } => "article:paused",
            DeskEvent::ArticleResumed { .. } => "article:resumed",
            DeskEvent::ArticleRetry { .. } => "article:retry",
            DeskEvent::ArticleTimeout { .. } => "article:timeout",
            DeskEvent::TranslationUpdated { .. } => "translation:updated",
            DeskEvent::ImageGenerating { .. } => "image:generating",
            DeskEvent::ImageReady { .. } => "image:ready",
            DeskEvent::ImageFailed { .. } => "image:failed",
            DeskEvent::SupervisorEvaluated { .. } => "supervisor:evaluated",
            DeskEvent::PublishComplete { .. } => "publish:complete",
        }
    }
}

/// Broadcast bus for DeskEvents
///
/// Wraps `tokio::sync::broadcast`: a single owner fans events out to any
/// number of live subscribers. A lagging or dropped receiver only affects
/// itself; the sender and the remaining subscribers are untouched, so
/// emission is best-effort by construction.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeskEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// Older events are dropped for receivers that fall more than
    /// `capacity` events behind.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers
    ///
    /// Returns the number of subscribers that received it. Zero subscribers
    /// is not an error: lifecycle progress never depends on listeners.
    pub fn emit(&self, event: DeskEvent) -> usize {
        let name = event.event_type();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                tracing::debug!("No subscribers for event {}", name);
                0
            }
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
