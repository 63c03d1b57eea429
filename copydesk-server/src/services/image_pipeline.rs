//! Image generation orchestration
//!
//! Walks the ordered backend chain until one produces an image, persists
//! the bytes to the static image storage, and records the reference on the
//! article's content. Image failure never touches the article status; the
//! image pipeline is a side pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use copydesk_common::config::Settings;
use copydesk_common::events::{DeskEvent, EventBus};
use copydesk_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db::contents;

use super::image_backends::{
    CloudDiffusionBackend, ImageBackend, ImageJobStatus, ImageKind, LocalDiffusionBackend,
};

pub struct ImagePipeline {
    db: SqlitePool,
    bus: EventBus,
    backends: Vec<Arc<dyn ImageBackend>>,
    storage_path: PathBuf,
    poll_timeout: Duration,
    poll_interval: Duration,
}

impl ImagePipeline {
    /// Default chain: local diffusion host first, cloud endpoint as fallback
    pub fn new(db: SqlitePool, bus: EventBus, settings: &Settings) -> Result<Self> {
        let backends: Vec<Arc<dyn ImageBackend>> = vec![
            Arc::new(LocalDiffusionBackend::new(&settings.image)?),
            Arc::new(CloudDiffusionBackend::new(&settings.image)?),
        ];

        Ok(Self::with_backends(
            db,
            bus,
            backends,
            settings.image_storage_path(),
            Duration::from_secs(settings.image.poll_timeout_secs),
            Duration::from_secs(settings.image.poll_interval_secs),
        ))
    }

    pub fn with_backends(
        db: SqlitePool,
        bus: EventBus,
        backends: Vec<Arc<dyn ImageBackend>>,
        storage_path: PathBuf,
        poll_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            bus,
            backends,
            storage_path,
            poll_timeout,
            poll_interval,
        }
    }

    /// Generate an image for an article. Each backend in the chain is tried
    /// at most once; the first success short-circuits the rest.
    pub async fn run(&self, article_id: Uuid, prompt: String, kind: ImageKind) -> Result<()> {
        self.bus.emit(DeskEvent::ImageGenerating { article_id });

        for backend in &self.backends {
            if !backend.available().await {
                tracing::debug!(
                    article_id = %article_id,
                    backend = backend.name(),
                    "Image backend unavailable, trying next"
                );
                continue;
            }

            match self.try_backend(backend.as_ref(), &prompt, kind).await {
                Ok(bytes) => {
                    let image_url = self.save_image(&bytes, article_id).await?;
                    contents::set_image(&self.db, article_id, &image_url, &prompt).await?;

                    tracing::info!(
                        article_id = %article_id,
                        backend = backend.name(),
                        image_url = %image_url,
                        "Image generated"
                    );
                    self.bus.emit(DeskEvent::ImageReady {
                        article_id,
                        image_url,
                    });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        article_id = %article_id,
                        backend = backend.name(),
                        error = %e,
                        "Image backend failed, trying next"
                    );
                }
            }
        }

        tracing::warn!(article_id = %article_id, "All image backends exhausted");
        self.bus.emit(DeskEvent::ImageFailed { article_id });
        Ok(())
    }

    /// submit → bounded poll → fetch against a single backend
    async fn try_backend(
        &self,
        backend: &dyn ImageBackend,
        prompt: &str,
        kind: ImageKind,
    ) -> Result<Vec<u8>> {
        let job = backend.submit(prompt, kind).await?;

        let mut elapsed = Duration::ZERO;
        loop {
            match backend.poll(&job).await? {
                ImageJobStatus::Completed => return backend.fetch(&job).await,
                ImageJobStatus::Failed => {
                    return Err(Error::ExternalFailure(format!(
                        "Backend {} reported job failure",
                        backend.name()
                    )));
                }
                ImageJobStatus::Pending => {}
            }

            if elapsed >= self.poll_timeout {
                return Err(Error::Timeout(format!(
                    "Backend {} did not finish within {:?}",
                    backend.name(),
                    self.poll_timeout
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
            elapsed += self.poll_interval;
        }
    }

    /// Persist the image bytes; returns the URL path recorded on the content
    async fn save_image(&self, bytes: &[u8], article_id: Uuid) -> Result<String> {
        tokio::fs::create_dir_all(&self.storage_path).await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let filename = format!("{}_{}.png", article_id, &suffix[..8]);
        let path = self.storage_path.join(&filename);
        tokio::fs::write(&path, bytes).await?;

        Ok(format!("/static/images/{}", filename))
    }
}
