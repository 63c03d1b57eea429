//! Capability traits for the translation providers
//!
//! The pipelines see providers only through these seams, so a failing or
//! unconfigured provider is a typed error, and tests can substitute fakes.

use async_trait::async_trait;
use copydesk_common::db::models::Recommendation;
use copydesk_common::Result;

/// Source-language article fields handed to providers
#[derive(Debug, Clone)]
pub struct SourceFields {
    pub title: String,
    pub lead: String,
    pub body: String,
}

/// Per-field machine translation result.
///
/// A `None` field means the provider produced nothing for it; the stored
/// value stays untouched.
#[derive(Debug, Clone, Default)]
pub struct TranslatedFields {
    pub title: Option<String>,
    pub lead: Option<String>,
    pub body: Option<String>,
}

impl TranslatedFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.lead.is_none() && self.body.is_none()
    }
}

/// Improved variants from the idiomatic review; `None` keeps the machine
/// translation
#[derive(Debug, Clone, Default)]
pub struct ReviewedFields {
    pub title: Option<String>,
    pub lead: Option<String>,
    pub body: Option<String>,
}

/// Stage 1: markup-preserving structural translation
#[async_trait]
pub trait StructuralTranslator: Send + Sync {
    async fn translate_fields(
        &self,
        source: &SourceFields,
        target_language: &str,
    ) -> Result<TranslatedFields>;
}

/// Stage 2: idiomatic review of a machine translation
#[async_trait]
pub trait IdiomaticReviewer: Send + Sync {
    async fn review_fields(
        &self,
        source: &SourceFields,
        translated: &TranslatedFields,
        target_language: &str,
    ) -> Result<ReviewedFields>;
}

/// Automated quality evaluation result
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub recommendation: Recommendation,
    pub justification: String,
    pub score: i64,
    pub style_tags: Vec<String>,
}

/// Scoring service invoked by the supervisor coordinator
#[async_trait]
pub trait QualityEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        source: &SourceFields,
        category: Option<&str>,
        tonality_profile: &str,
    ) -> Result<Evaluation>;
}
