//! CMS publishing client (WordPress-compatible REST API)
//!
//! The publish flow is a collaborator at the edge of the pipeline: create a
//! post for the canonical content and one per approved translation. Wire
//! details stay inside this module.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use copydesk_common::config::CmsSettings;
use copydesk_common::{Error, Result};

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: i64,
}

pub struct CmsClient {
    http: reqwest::Client,
    api_url: String,
    username: Option<String>,
    app_password: Option<String>,
}

impl CmsClient {
    pub fn new(settings: &CmsSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            app_password: settings.app_password.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.app_password.is_some()
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (self.username.as_deref(), self.app_password.as_deref()) {
            (Some(user), Some(password)) => Ok((user, password)),
            _ => Err(Error::ExternalUnavailable("CMS credentials not configured".into())),
        }
    }

    /// Create a post. Returns the CMS post id.
    pub async fn publish_post(
        &self,
        title: &str,
        content: &str,
        excerpt: &str,
        language: Option<&str>,
        seo_title: Option<&str>,
        seo_description: Option<&str>,
    ) -> Result<i64> {
        let (user, password) = self.credentials()?;

        let mut payload = json!({
            "title": title,
            "content": content,
            "excerpt": excerpt,
            "status": "publish",
        });
        if let Some(language) = language {
            payload["lang"] = json!(language);
        }
        let mut meta = serde_json::Map::new();
        if let Some(seo_title) = seo_title {
            meta.insert("_yoast_wpseo_title".to_string(), json!(seo_title));
        }
        if let Some(seo_description) = seo_description {
            meta.insert("_yoast_wpseo_metadesc".to_string(), json!(seo_description));
        }
        if !meta.is_empty() {
            payload["meta"] = serde_json::Value::Object(meta);
        }

        let url = format!("{}/posts", self.api_url);
        let resp = self
            .http
            .post(&url)
            .basic_auth(user, Some(password))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::ExternalUnavailable(format!("CMS unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "CMS returned {}",
                resp.status()
            )));
        }

        let post: PostResponse = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed CMS response: {}", e)))?;

        Ok(post.id)
    }
}
