//! Image generation backends
//!
//! Each backend is a narrow capability: probe availability, submit a job,
//! poll it, fetch the result bytes. The orchestrator in `image_pipeline`
//! walks backends in order and never calls past the first success.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

use copydesk_common::config::ImageSettings;
use copydesk_common::{Error, Result};

/// Visual style of the generated image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Illustration,
    Infographic,
    Photo,
    Animation,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Illustration => "illustration",
            ImageKind::Infographic => "infographic",
            ImageKind::Photo => "photo",
            ImageKind::Animation => "animation",
        }
    }
}

impl FromStr for ImageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "illustration" => Ok(ImageKind::Illustration),
            "infographic" => Ok(ImageKind::Infographic),
            "photo" => Ok(ImageKind::Photo),
            "animation" => Ok(ImageKind::Animation),
            other => Err(Error::InvalidInput(format!("Unknown image kind '{}'", other))),
        }
    }
}

/// Generation parameters per image kind
struct WorkflowTemplate {
    width: u32,
    height: u32,
    steps: u32,
    cfg: f64,
    sampler: &'static str,
    style_prefix: &'static str,
}

fn template_for(kind: ImageKind) -> WorkflowTemplate {
    match kind {
        ImageKind::Illustration => WorkflowTemplate {
            width: 1024,
            height: 1024,
            steps: 30,
            cfg: 7.5,
            sampler: "euler_ancestral",
            style_prefix: "digital illustration, editorial style, ",
        },
        ImageKind::Infographic => WorkflowTemplate {
            width: 1024,
            height: 1536,
            steps: 30,
            cfg: 7.0,
            sampler: "euler",
            style_prefix: "clean infographic, data visualization, minimal design, ",
        },
        ImageKind::Photo => WorkflowTemplate {
            width: 1024,
            height: 768,
            steps: 35,
            cfg: 7.5,
            sampler: "dpmpp_2m",
            style_prefix: "photorealistic, editorial photography, ",
        },
        ImageKind::Animation => WorkflowTemplate {
            width: 1024,
            height: 1024,
            steps: 25,
            cfg: 7.0,
            sampler: "euler_ancestral",
            style_prefix: "animated style, motion graphics, ",
        },
    }
}

const NEGATIVE_PROMPT: &str = "watermark, text, logo, signature, blurry, low quality, \
     deformed, ugly, duplicate, mutilated";

const CHECKPOINT: &str = "sd_xl_base_1.0.safetensors";

/// Deterministic seed derived from the prompt
fn prompt_seed(prompt: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    (hasher.finish() % u32::MAX as u64) as u32
}

/// Standard SDXL txt2img workflow in the diffusion host's API format
fn build_workflow(prompt: &str, kind: ImageKind, client_id: &str) -> serde_json::Value {
    let template = template_for(kind);
    let full_prompt = format!("{}{}", template.style_prefix, prompt);

    json!({
        "prompt": {
            "3": {
                "class_type": "KSampler",
                "inputs": {
                    "seed": prompt_seed(prompt),
                    "steps": template.steps,
                    "cfg": template.cfg,
                    "sampler_name": template.sampler,
                    "scheduler": "normal",
                    "denoise": 1.0,
                    "model": ["4", 0],
                    "positive": ["6", 0],
                    "negative": ["7", 0],
                    "latent_image": ["5", 0],
                },
            },
            "4": {
                "class_type": "CheckpointLoaderSimple",
                "inputs": {"ckpt_name": CHECKPOINT},
            },
            "5": {
                "class_type": "EmptyLatentImage",
                "inputs": {
                    "width": template.width,
                    "height": template.height,
                    "batch_size": 1,
                },
            },
            "6": {
                "class_type": "CLIPTextEncode",
                "inputs": {"text": full_prompt, "clip": ["4", 1]},
            },
            "7": {
                "class_type": "CLIPTextEncode",
                "inputs": {"text": NEGATIVE_PROMPT, "clip": ["4", 1]},
            },
            "8": {
                "class_type": "VAEDecode",
                "inputs": {"samples": ["3", 0], "vae": ["4", 2]},
            },
            "9": {
                "class_type": "SaveImage",
                "inputs": {"filename_prefix": format!("copydesk_{}", &client_id[..8]), "images": ["8", 0]},
            },
        },
        "client_id": client_id,
    })
}

/// Handle for a submitted generation job
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub id: String,
}

/// Poll outcome for a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageJobStatus {
    Pending,
    Completed,
    Failed,
}

/// One interchangeable image generation backend
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap reachability/configuration probe
    async fn available(&self) -> bool;

    async fn submit(&self, prompt: &str, kind: ImageKind) -> Result<ImageJob>;

    async fn poll(&self, job: &ImageJob) -> Result<ImageJobStatus>;

    async fn fetch(&self, job: &ImageJob) -> Result<Vec<u8>>;
}

/// Local diffusion host (fast path)
pub struct LocalDiffusionBackend {
    http: reqwest::Client,
    base_url: String,
}

impl LocalDiffusionBackend {
    pub fn new(settings: &ImageSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.local_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ImageBackend for LocalDiffusionBackend {
    fn name(&self) -> &'static str {
        "local-diffusion"
    }

    async fn available(&self) -> bool {
        let url = format!("{}/system_stats", self.base_url);
        match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn submit(&self, prompt: &str, kind: ImageKind) -> Result<ImageJob> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let workflow = build_workflow(prompt, kind, &client_id);

        let url = format!("{}/prompt", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&workflow)
            .send()
            .await
            .map_err(|e| Error::ExternalUnavailable(format!("Diffusion host unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "Diffusion host rejected workflow: {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed queue response: {}", e)))?;

        let prompt_id = body["prompt_id"]
            .as_str()
            .ok_or_else(|| Error::ExternalFailure("Queue response missing prompt_id".into()))?;

        Ok(ImageJob {
            id: prompt_id.to_string(),
        })
    }

    async fn poll(&self, job: &ImageJob) -> Result<ImageJobStatus> {
        let url = format!("{}/history/{}", self.base_url, job.id);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ExternalUnavailable(format!("Diffusion host unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Ok(ImageJobStatus::Pending);
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed history response: {}", e)))?;

        let Some(entry) = body.get(&job.id) else {
            return Ok(ImageJobStatus::Pending);
        };

        let status = &entry["status"];
        if status["completed"].as_bool().unwrap_or(false) {
            Ok(ImageJobStatus::Completed)
        } else if status["status_str"].as_str() == Some("error") {
            Ok(ImageJobStatus::Failed)
        } else {
            Ok(ImageJobStatus::Pending)
        }
    }

    async fn fetch(&self, job: &ImageJob) -> Result<Vec<u8>> {
        let url = format!("{}/history/{}", self.base_url, job.id);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ExternalUnavailable(format!("Diffusion host unreachable: {}", e)))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed history response: {}", e)))?;

        let outputs = body[&job.id]["outputs"]
            .as_object()
            .ok_or_else(|| Error::ExternalFailure("History entry has no outputs".into()))?;

        for node_output in outputs.values() {
            let Some(image) = node_output["images"].as_array().and_then(|a| a.first()) else {
                continue;
            };
            let filename = image["filename"]
                .as_str()
                .ok_or_else(|| Error::ExternalFailure("Image output missing filename".into()))?;

            let view_url = format!("{}/view", self.base_url);
            let resp = self
                .http
                .get(&view_url)
                .query(&[
                    ("filename", filename),
                    ("subfolder", image["subfolder"].as_str().unwrap_or("")),
                    ("type", image["type"].as_str().unwrap_or("output")),
                ])
                .send()
                .await
                .map_err(|e| {
                    Error::ExternalUnavailable(format!("Diffusion host unreachable: {}", e))
                })?;

            if !resp.status().is_success() {
                return Err(Error::ExternalFailure(format!(
                    "Image download returned {}",
                    resp.status()
                )));
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| Error::ExternalFailure(format!("Image download failed: {}", e)))?;
            return Ok(bytes.to_vec());
        }

        Err(Error::ExternalFailure("No image in job outputs".into()))
    }
}

/// Cloud serverless diffusion endpoint (fallback path)
pub struct CloudDiffusionBackend {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl CloudDiffusionBackend {
    pub fn new(settings: &ImageSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings
                .cloud_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_key: settings.cloud_api_key.clone(),
        })
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (self.base_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(Error::ExternalUnavailable(
                "Cloud diffusion backend not configured".into(),
            )),
        }
    }

    async fn job_status(&self, job_id: &str) -> Result<serde_json::Value> {
        let (base_url, api_key) = self.credentials()?;
        let url = format!("{}/status/{}", base_url, job_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| Error::ExternalUnavailable(format!("Cloud backend unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "Cloud status returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed status response: {}", e)))
    }
}

#[async_trait]
impl ImageBackend for CloudDiffusionBackend {
    fn name(&self) -> &'static str {
        "cloud-diffusion"
    }

    async fn available(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn submit(&self, prompt: &str, kind: ImageKind) -> Result<ImageJob> {
        let (base_url, api_key) = self.credentials()?;
        let client_id = uuid::Uuid::new_v4().to_string();
        let workflow = build_workflow(prompt, kind, &client_id);

        let url = format!("{}/run", base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({ "input": { "workflow": workflow["prompt"] } }))
            .send()
            .await
            .map_err(|e| Error::ExternalUnavailable(format!("Cloud backend unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::ExternalFailure(format!(
                "Cloud backend rejected job: {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::ExternalFailure(format!("Malformed run response: {}", e)))?;

        let job_id = body["id"]
            .as_str()
            .ok_or_else(|| Error::ExternalFailure("Run response missing job id".into()))?;

        Ok(ImageJob {
            id: job_id.to_string(),
        })
    }

    async fn poll(&self, job: &ImageJob) -> Result<ImageJobStatus> {
        let body = self.job_status(&job.id).await?;
        match body["status"].as_str() {
            Some("COMPLETED") => Ok(ImageJobStatus::Completed),
            Some("FAILED") | Some("CANCELLED") => Ok(ImageJobStatus::Failed),
            _ => Ok(ImageJobStatus::Pending),
        }
    }

    async fn fetch(&self, job: &ImageJob) -> Result<Vec<u8>> {
        let body = self.job_status(&job.id).await?;
        let output = &body["output"];

        // Endpoints return either a download URL or inline base64
        let image_url = output["image_url"].as_str().or_else(|| output["url"].as_str());
        if let Some(image_url) = image_url {
            let resp = self.http.get(image_url).send().await.map_err(|e| {
                Error::ExternalUnavailable(format!("Image download unreachable: {}", e))
            })?;
            if !resp.status().is_success() {
                return Err(Error::ExternalFailure(format!(
                    "Image download returned {}",
                    resp.status()
                )));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| Error::ExternalFailure(format!("Image download failed: {}", e)))?;
            return Ok(bytes.to_vec());
        }

        let b64 = output["image_base64"]
            .as_str()
            .or_else(|| output["base64"].as_str())
            .ok_or_else(|| Error::ExternalFailure("Job output carries no image".into()))?;

        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| Error::ExternalFailure(format!("Invalid base64 image payload: {}", e)))
    }
}
