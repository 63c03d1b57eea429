//! Structural translation client (DeepL-compatible API)
//!
//! Stage 1 of the translation pipeline: fast machine translation that
//! preserves HTML markup in article bodies.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use copydesk_common::config::TranslationSettings;
use copydesk_common::{Error, Result};

use super::provider::{SourceFields, StructuralTranslator, TranslatedFields};

/// Provider-specific target language codes
fn provider_lang_code(lang: &str) -> String {
    match lang {
        "en" => "EN-US".to_string(),
        other => other.to_uppercase(),
    }
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<TranslatedText>,
}

#[derive(Debug, Deserialize)]
struct TranslatedText {
    text: String,
}

pub struct TranslationClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    source_language: String,
}

impl TranslationClient {
    pub fn new(settings: &TranslationSettings, source_language: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            source_language: source_language.to_uppercase(),
        })
    }

    /// Translate one text. `tag_handling` is "html" for markup bodies.
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        tag_handling: Option<&str>,
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::ExternalUnavailable("Translation API key not configured".into()))?;

        let mut form = vec![
            ("text", text.to_string()),
            ("source_lang", self.source_language.clone()),
            ("target_lang", provider_lang_code(target_language)),
            ("split_sentences", "nonewlines".to_string()),
        ];
        if let Some(handling) = tag_handling {
            form.push(("tag_handling", handling.to_string()));
        }

        let url = format!("{}/translate", self.api_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {}", api_key))
            .form(&form)
            .send()
            .await
            .map_err(classify_request_error)?;

        if !resp.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "Translation API returned {}",
                resp.status()
            )));
        }

        let parsed: TranslateResponse = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed translation response: {}", e)))?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| Error::ExternalFailure("Empty translation response".into()))
    }
}

#[async_trait]
impl StructuralTranslator for TranslationClient {
    /// Translate title/lead/body. Individual field failures degrade to
    /// `None` (prior content stays untouched); a wholly failed request
    /// surfaces the body's error.
    async fn translate_fields(
        &self,
        source: &SourceFields,
        target_language: &str,
    ) -> Result<TranslatedFields> {
        let title = match self.translate_text(&source.title, target_language, None).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(language = target_language, error = %e, "Title translation failed");
                None
            }
        };

        let lead = if source.lead.is_empty() {
            None
        } else {
            match self.translate_text(&source.lead, target_language, None).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!(language = target_language, error = %e, "Lead translation failed");
                    None
                }
            }
        };

        let body = match self
            .translate_text(&source.body, target_language, Some("html"))
            .await
        {
            Ok(text) => Some(text),
            Err(e) if title.is_none() && lead.is_none() => return Err(e),
            Err(e) => {
                tracing::warn!(language = target_language, error = %e, "Body translation failed");
                None
            }
        };

        Ok(TranslatedFields { title, lead, body })
    }
}

fn classify_request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("Translation request timed out: {}", e))
    } else if e.is_connect() {
        Error::ExternalUnavailable(format!("Translation API unreachable: {}", e))
    } else {
        Error::ExternalFailure(format!("Translation request failed: {}", e))
    }
}
