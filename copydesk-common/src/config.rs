//! Configuration loading
//!
//! Settings are resolved once at startup and passed to components as an
//! immutable value. Resolution priority:
//! 1. Environment variables (`COPYDESK_*`, highest priority)
//! 2. TOML config file (`COPYDESK_CONFIG`, else `~/.config/copydesk/config.toml`)
//! 3. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Feature capabilities, checked explicitly at the route layer.
///
/// Disabled features answer 404 on their endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Bulk topic submission (POST /api/articles/bulk)
    pub bulk_input: bool,
    /// Illustrative image generation pipeline
    pub image_generation: bool,
    /// CMS publishing
    pub publishing: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            bulk_input: true,
            image_generation: true,
            publishing: false,
        }
    }
}

/// Workflow engine (outbound trigger + inbound callback) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Base URL of the external workflow engine
    pub url: String,
    /// Callback URL the engine posts results to
    pub callback_url: String,
    /// Shared secret expected in the x-webhook-token header.
    /// None skips validation (development mode).
    pub webhook_token: Option<String>,
    /// Outbound trigger request timeout (seconds)
    pub trigger_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:5678".to_string(),
            callback_url: "http://localhost:8080/api/webhook/engine".to_string(),
            webhook_token: None,
            trigger_timeout_secs: 10,
        }
    }
}

/// Structural (machine) translation provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api-free.deepl.com/v2".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// LLM provider settings (idiomatic review, supervisor scoring, embeddings)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    /// Minimum interval between requests (milliseconds)
    pub min_request_interval_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.mistral.ai/v1".to_string(),
            api_key: None,
            model: "mistral-large-latest".to_string(),
            embedding_model: "mistral-embed".to_string(),
            timeout_secs: 60,
            min_request_interval_ms: 500,
        }
    }
}

/// Image generation backend settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Local diffusion backend (fast path)
    pub local_url: String,
    /// Cloud diffusion backend (fallback)
    pub cloud_url: Option<String>,
    pub cloud_api_key: Option<String>,
    /// Overall per-backend poll budget (seconds)
    pub poll_timeout_secs: u64,
    /// Delay between poll attempts (seconds)
    pub poll_interval_secs: u64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            local_url: "http://localhost:8188".to_string(),
            cloud_url: None,
            cloud_api_key: None,
            poll_timeout_secs: 300,
            poll_interval_secs: 2,
        }
    }
}

/// CMS publishing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CmsSettings {
    pub api_url: String,
    pub username: Option<String>,
    pub app_password: Option<String>,
}

impl Default for CmsSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost/wp-json/wp/v2".to_string(),
            username: None,
            app_password: None,
        }
    }
}

/// Generation queue / watchdog settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Watchdog sweep interval (seconds)
    pub watchdog_interval_secs: u64,
    /// How far the deadline is pushed on each retry (seconds)
    pub retry_window_secs: i64,
    /// Default max generation retries for new articles
    pub max_retries: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            watchdog_interval_secs: 60,
            retry_window_secs: 600,
            max_retries: 3,
        }
    }
}

/// Top-level service settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub bind_address: Option<String>,
    pub database_path: Option<PathBuf>,
    pub image_storage_path: Option<PathBuf>,
    /// Source language of canonical content
    pub source_language: Option<String>,
    pub engine: EngineSettings,
    pub translation: TranslationSettings,
    pub llm: LlmSettings,
    pub image: ImageSettings,
    pub cms: CmsSettings,
    pub queue: QueueSettings,
    pub features: Features,
}

impl Settings {
    /// Load settings from TOML file + environment overrides.
    ///
    /// A missing config file is not an error: defaults apply and a warning
    /// is logged. A present but malformed file is an error.
    pub fn load() -> Result<Self> {
        let mut settings = match config_file_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)?;
                let parsed: Settings = toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                tracing::info!("Loaded config from {}", path.display());
                parsed
            }
            _ => {
                tracing::warn!("No config file found, using defaults");
                Settings::default()
            }
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Environment variables override file values (secrets and endpoints)
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("COPYDESK_BIND_ADDRESS") {
            self.bind_address = Some(v);
        }
        if let Ok(v) = std::env::var("COPYDESK_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("COPYDESK_ENGINE_URL") {
            self.engine.url = v;
        }
        if let Ok(v) = std::env::var("COPYDESK_WEBHOOK_TOKEN") {
            self.engine.webhook_token = Some(v);
        }
        if let Ok(v) = std::env::var("COPYDESK_TRANSLATION_API_KEY") {
            self.translation.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("COPYDESK_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("COPYDESK_CMS_APP_PASSWORD") {
            self.cms.app_password = Some(v);
        }
    }

    pub fn bind_address(&self) -> &str {
        self.bind_address.as_deref().unwrap_or("127.0.0.1:8080")
    }

    pub fn source_language(&self) -> &str {
        self.source_language.as_deref().unwrap_or("de")
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("copydesk.db"))
    }

    pub fn image_storage_path(&self) -> PathBuf {
        self.image_storage_path
            .clone()
            .unwrap_or_else(|| data_dir().join("images"))
    }
}

/// Config file location: `COPYDESK_CONFIG` env, else platform config dir
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("COPYDESK_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("copydesk").join("config.toml"))
}

/// Default data directory for database and image storage
fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("copydesk"))
        .unwrap_or_else(|| PathBuf::from("./copydesk_data"))
}
