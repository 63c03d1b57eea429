//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Article lifecycle status
///
/// `published` and `cancelled` are terminal. `failed` and `timeout` are
/// terminal unless explicitly retried. `failed` is only ever set by the
/// external engine's callback, never inferred internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Generating,
    Translating,
    Review,
    Published,
    Failed,
    Timeout,
    Paused,
    Cancelled,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Generating => "generating",
            ArticleStatus::Translating => "translating",
            ArticleStatus::Review => "review",
            ArticleStatus::Published => "published",
            ArticleStatus::Failed => "failed",
            ArticleStatus::Timeout => "timeout",
            ArticleStatus::Paused => "paused",
            ArticleStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses that accept no further automated lifecycle progress
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ArticleStatus::Published
                | ArticleStatus::Cancelled
                | ArticleStatus::Failed
                | ArticleStatus::Timeout
                | ArticleStatus::Paused
        )
    }

    /// Statuses that release the content fingerprint for resubmission
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ArticleStatus::Failed | ArticleStatus::Cancelled)
    }

    pub const ALL: [ArticleStatus; 8] = [
        ArticleStatus::Generating,
        ArticleStatus::Translating,
        ArticleStatus::Review,
        ArticleStatus::Published,
        ArticleStatus::Failed,
        ArticleStatus::Timeout,
        ArticleStatus::Paused,
        ArticleStatus::Cancelled,
    ];
}

impl FromStr for ArticleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "generating" => Ok(ArticleStatus::Generating),
            "translating" => Ok(ArticleStatus::Translating),
            "review" => Ok(ArticleStatus::Review),
            "published" => Ok(ArticleStatus::Published),
            "failed" => Ok(ArticleStatus::Failed),
            "timeout" => Ok(ArticleStatus::Timeout),
            "paused" => Ok(ArticleStatus::Paused),
            "cancelled" => Ok(ArticleStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("Unknown article status '{}'", other))),
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kicked off the article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Prompt,
    Url,
    Rss,
    Calendar,
    Image,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Prompt => "prompt",
            TriggerKind::Url => "url",
            TriggerKind::Rss => "rss",
            TriggerKind::Calendar => "calendar",
            TriggerKind::Image => "image",
        }
    }
}

impl FromStr for TriggerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "prompt" => Ok(TriggerKind::Prompt),
            "url" => Ok(TriggerKind::Url),
            "rss" => Ok(TriggerKind::Rss),
            "calendar" => Ok(TriggerKind::Calendar),
            "image" => Ok(TriggerKind::Image),
            other => Err(Error::InvalidInput(format!("Unknown trigger kind '{}'", other))),
        }
    }
}

/// Per-language translation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Pending,
    MachineTranslated,
    Reviewed,
    Approved,
}

impl TranslationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStatus::Pending => "pending",
            TranslationStatus::MachineTranslated => "machine_translated",
            TranslationStatus::Reviewed => "reviewed",
            TranslationStatus::Approved => "approved",
        }
    }
}

impl FromStr for TranslationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(TranslationStatus::Pending),
            "machine_translated" => Ok(TranslationStatus::MachineTranslated),
            "reviewed" => Ok(TranslationStatus::Reviewed),
            "approved" => Ok(TranslationStatus::Approved),
            other => Err(Error::InvalidInput(format!(
                "Unknown translation status '{}'",
                other
            ))),
        }
    }
}

/// Supervisor recommendation / editor decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Revise,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Approve => "approve",
            Recommendation::Revise => "revise",
            Recommendation::Reject => "reject",
        }
    }
}

impl FromStr for Recommendation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "approve" => Ok(Recommendation::Approve),
            "revise" => Ok(Recommendation::Revise),
            "reject" => Ok(Recommendation::Reject),
            other => Err(Error::InvalidInput(format!("Unknown recommendation '{}'", other))),
        }
    }
}

/// A unit of editorial work tracked through the lifecycle state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub trigger_kind: TriggerKind,
    pub status: ArticleStatus,
    pub category: Option<String>,
    /// Enabled target languages, e.g. {"de": true, "en": true, "fr": false}
    pub languages: BTreeMap<String, bool>,
    /// Context URLs supplied with the creation request
    pub context_urls: Vec<String>,
    /// Fingerprint of the creation request for duplicate detection
    pub content_hash: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub last_error: Option<String>,
    /// Generation deadline; set iff status = generating
    pub timeout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Enabled languages minus the source language, sorted
    pub fn target_languages(&self, source_language: &str) -> Vec<String> {
        self.languages
            .iter()
            .filter(|(lang, enabled)| **enabled && lang.as_str() != source_language)
            .map(|(lang, _)| lang.clone())
            .collect()
    }
}

/// Canonical (source-language) content of an article; unique per article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub article_id: Uuid,
    pub title: String,
    pub lead: Option<String>,
    pub body: Option<String>,
    pub sources: Option<serde_json::Value>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub image_url: Option<String>,
    pub image_prompt: Option<String>,
    /// Semantic embedding of title+lead+body
    pub embedding: Option<Vec<f32>>,
    pub cms_post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Per-language rendering of an article; unique per (article, language)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub id: i64,
    pub article_id: Uuid,
    pub language: String,
    pub title: Option<String>,
    pub lead: Option<String>,
    pub body: Option<String>,
    pub status: TranslationStatus,
    pub cms_post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Immutable automated evaluation, later annotated with the editor's call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorDecision {
    pub id: i64,
    pub article_id: Uuid,
    pub recommendation: Recommendation,
    pub justification: String,
    pub score: i64,
    pub style_tags: Vec<String>,
    pub editor_decision: Option<Recommendation>,
    pub editor_feedback: Option<String>,
    /// Editor decision differs from the automated recommendation
    pub deviation: bool,
    pub created_at: DateTime<Utc>,
}

/// A learned style dimension of the tonality profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneTrait {
    pub id: i64,
    pub label: String,
    pub value: Option<String>,
    /// Clamped to [0.1, 1.0]
    pub weight: f64,
    /// Number of editor approvals confirming this trait
    pub evidence: i64,
    pub updated_at: DateTime<Utc>,
}

/// Per-category approval statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRanking {
    pub id: i64,
    pub topic: String,
    pub category: String,
    pub article_count: i64,
    /// Exponentially smoothed approval rate in [0.0, 1.0]
    pub approval_rate: f64,
    pub last_article_at: Option<DateTime<Utc>>,
}
