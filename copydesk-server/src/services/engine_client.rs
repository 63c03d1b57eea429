//! Workflow engine client
//!
//! Fires the outbound generation trigger. The engine answers asynchronously
//! through the callback endpoint; an unreachable engine is not an error at
//! the call site — the article stays `generating` and the watchdog retries.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use copydesk_common::config::EngineSettings;
use copydesk_common::db::models::TriggerKind;
use copydesk_common::{Error, Result};

/// Outbound trigger payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTrigger {
    pub article_id: Uuid,
    pub trigger_kind: TriggerKind,
    pub text: String,
    pub category: Option<String>,
    pub languages: BTreeMap<String, bool>,
    pub urls: Vec<String>,
    pub image_kind: Option<String>,
    pub callback_url: String,
}

pub struct EngineClient {
    http: reqwest::Client,
    base_url: String,
    callback_url: String,
}

impl EngineClient {
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.trigger_timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            callback_url: settings.callback_url.clone(),
        })
    }

    /// Trigger the generation pipeline for an article. Best-effort:
    /// failures are logged and reported as `false`, never raised.
    pub async fn trigger_generation(
        &self,
        article_id: Uuid,
        trigger_kind: TriggerKind,
        text: &str,
        category: Option<&str>,
        languages: &BTreeMap<String, bool>,
        urls: &[String],
        image_kind: Option<&str>,
    ) -> bool {
        let payload = GenerationTrigger {
            article_id,
            trigger_kind,
            text: text.to_string(),
            category: category.map(str::to_string),
            languages: languages.clone(),
            urls: urls.to_vec(),
            image_kind: image_kind.map(str::to_string),
            callback_url: self.callback_url.clone(),
        };

        let url = format!("{}/webhook/copydesk-generate", self.base_url);
        match self.http.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(article_id = %article_id, "Generation trigger accepted");
                true
            }
            Ok(resp) => {
                tracing::warn!(
                    article_id = %article_id,
                    status = %resp.status(),
                    "Generation trigger rejected by engine"
                );
                false
            }
            Err(e) => {
                // Engine unreachable; the watchdog will re-issue the trigger
                tracing::warn!(article_id = %article_id, error = %e, "Generation trigger failed");
                false
            }
        }
    }
}
