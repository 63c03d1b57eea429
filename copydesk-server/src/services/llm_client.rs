//! LLM provider client
//!
//! One client covers the three LLM-backed capabilities: idiomatic
//! translation review, supervisor quality scoring, and content embeddings.
//! All calls run in JSON mode with a bounded timeout and a minimum
//! interval between requests.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use copydesk_common::config::LlmSettings;
use copydesk_common::db::models::Recommendation;
use copydesk_common::{Error, Result};

use super::provider::{
    Evaluation, IdiomaticReviewer, QualityEvaluator, ReviewedFields, SourceFields,
    TranslatedFields,
};

const REVIEW_PROMPT: &str = "You are a professional translation reviewer.\n\
Check the following machine translation for:\n\
1. Idiomatic correctness (natural flow)\n\
2. Cultural appropriateness\n\
3. Domain terminology\n\
4. HTML tag integrity\n\n\
Original text:\n{original}\n\n\
Machine translation ({lang}):\n{translation}\n\n\
Answer strictly as JSON:\n\
{\"improved\": \"improved translation (or the original if already good)\",\n \
\"quality_score\": 0-100,\n \"needs_revision\": true/false}";

const EVALUATION_PROMPT: &str = "You are the quality supervisor of an AI editorial system.\n\
Rate the following article on these criteria:\n\
1. Content quality (0-25): research, factual accuracy, depth\n\
2. Language quality (0-25): grammar, style, readability\n\
3. Tonality (0-25): does it match the editorial profile?\n\
4. SEO & structure (0-25): title, lead, paragraph structure, keywords\n\n\
Current editorial tonality profile:\n{tonality_profile}\n\n\
Article:\nTitle: {title}\nLead: {lead}\nBody: {body}\nCategory: {category}\n\n\
Answer strictly as JSON:\n\
{\"score\": 0-100,\n \"recommendation\": \"approve\" | \"revise\" | \"reject\",\n \
\"justification\": \"short justification (2-3 sentences)\",\n \
\"style_tags\": [\"factual\", \"informative\", ...]}";

/// Minimum-interval limiter shared by all request paths
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting LLM request: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ReviewVerdict {
    improved: Option<String>,
    #[serde(default)]
    needs_revision: bool,
}

#[derive(Debug, Deserialize)]
struct EvaluationVerdict {
    score: i64,
    recommendation: String,
    justification: String,
    #[serde(default)]
    style_tags: Vec<String>,
}

pub struct LlmClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    rate_limiter: Arc<RateLimiter>,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            embedding_model: settings.embedding_model.clone(),
            rate_limiter: Arc::new(RateLimiter::new(settings.min_request_interval_ms)),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::ExternalUnavailable("LLM API key not configured".into()))
    }

    /// One JSON-mode chat completion; returns the parsed content object
    async fn chat_json(&self, prompt: String) -> Result<serde_json::Value> {
        let api_key = self.api_key()?;
        self.rate_limiter.wait().await;

        let url = format!("{}/chat/completions", self.api_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.1,
                "response_format": {"type": "json_object"},
            }))
            .send()
            .await
            .map_err(classify_request_error)?;

        if !resp.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "LLM API returned {}",
                resp.status()
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed LLM response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::ExternalFailure("Empty LLM response".into()))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::ExternalFailure(format!("LLM returned invalid JSON: {}", e)))
    }

    async fn review_text(
        &self,
        original: &str,
        translation: &str,
        target_language: &str,
    ) -> Result<ReviewVerdict> {
        let prompt = REVIEW_PROMPT
            .replace("{original}", original)
            .replace("{translation}", translation)
            .replace("{lang}", target_language);

        let value = self.chat_json(prompt).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::ExternalFailure(format!("Malformed review verdict: {}", e)))
    }

    /// Semantic embedding of article text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self.api_key()?;
        self.rate_limiter.wait().await;

        let url = format!("{}/embeddings", self.api_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.embedding_model,
                "input": [text],
            }))
            .send()
            .await
            .map_err(classify_request_error)?;

        if !resp.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "Embedding API returned {}",
                resp.status()
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed embedding response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::ExternalFailure("Empty embedding response".into()))
    }
}

/// Combine article fields into one text for embedding; the body is
/// truncated to stay inside provider token limits
pub fn build_embedding_text(title: &str, lead: Option<&str>, body: Option<&str>) -> String {
    let mut parts = vec![title.to_string()];
    if let Some(lead) = lead {
        if !lead.is_empty() {
            parts.push(lead.to_string());
        }
    }
    if let Some(body) = body {
        if !body.is_empty() {
            let truncated: String = body.chars().take(2000).collect();
            parts.push(truncated);
        }
    }
    parts.join("\n\n")
}

#[async_trait]
impl IdiomaticReviewer for LlmClient {
    /// Review each translated field; only improved variants come back.
    /// Individual field failures degrade to "keep the machine translation".
    async fn review_fields(
        &self,
        source: &SourceFields,
        translated: &TranslatedFields,
        target_language: &str,
    ) -> Result<ReviewedFields> {
        // Nothing to review without a translated body
        let body = translated
            .body
            .as_deref()
            .ok_or_else(|| Error::ContentNotReady("No translated body to review".into()))?;

        let mut reviewed = ReviewedFields::default();

        let body_verdict = self
            .review_text(&source.body, body, target_language)
            .await?;
        if body_verdict.needs_revision {
            reviewed.body = body_verdict.improved;
        }

        if let Some(title) = translated.title.as_deref() {
            match self.review_text(&source.title, title, target_language).await {
                Ok(verdict) if verdict.needs_revision => reviewed.title = verdict.improved,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(language = target_language, error = %e, "Title review failed");
                }
            }
        }

        if let Some(lead) = translated.lead.as_deref() {
            match self.review_text(&source.lead, lead, target_language).await {
                Ok(verdict) if verdict.needs_revision => reviewed.lead = verdict.improved,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(language = target_language, error = %e, "Lead review failed");
                }
            }
        }

        Ok(reviewed)
    }
}

#[async_trait]
impl QualityEvaluator for LlmClient {
    async fn evaluate(
        &self,
        source: &SourceFields,
        category: Option<&str>,
        tonality_profile: &str,
    ) -> Result<Evaluation> {
        let prompt = EVALUATION_PROMPT
            .replace("{tonality_profile}", tonality_profile)
            .replace("{title}", &source.title)
            .replace("{lead}", &source.lead)
            .replace("{body}", &source.body)
            .replace("{category}", category.unwrap_or("general"));

        let value = self.chat_json(prompt).await?;
        let verdict: EvaluationVerdict = serde_json::from_value(value)
            .map_err(|e| Error::ExternalFailure(format!("Malformed evaluation verdict: {}", e)))?;

        let recommendation: Recommendation = verdict.recommendation.parse().map_err(|_| {
            Error::ExternalFailure(format!(
                "Unknown recommendation '{}' from evaluator",
                verdict.recommendation
            ))
        })?;

        Ok(Evaluation {
            recommendation,
            justification: verdict.justification,
            score: verdict.score.clamp(0, 100),
            style_tags: verdict.style_tags,
        })
    }
}

fn classify_request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("LLM request timed out: {}", e))
    } else if e.is_connect() {
        Error::ExternalUnavailable(format!("LLM API unreachable: {}", e))
    } else {
        Error::ExternalFailure(format!("LLM request failed: {}", e))
    }
}
