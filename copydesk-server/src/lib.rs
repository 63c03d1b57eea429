//! copydesk-server library interface
//!
//! Exposes the application state and router for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod services;
pub mod tasks;

pub use crate::error::{ApiError, ApiResult};

use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use copydesk_common::config::Settings;
use copydesk_common::events::EventBus;
use copydesk_common::Result;

use crate::lifecycle::ArticleLifecycle;
use crate::services::cms_client::CmsClient;
use crate::services::engine_client::EngineClient;
use crate::services::image_pipeline::ImagePipeline;
use crate::services::llm_client::LlmClient;
use crate::services::provider::{IdiomaticReviewer, QualityEvaluator, StructuralTranslator};
use crate::services::supervisor::SupervisorCoordinator;
use crate::services::translation_client::TranslationClient;
use crate::services::translation_pipeline::TranslationPipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub settings: Arc<Settings>,
    pub lifecycle: Arc<ArticleLifecycle>,
    pub translation_pipeline: Arc<TranslationPipeline>,
    pub image_pipeline: Arc<ImagePipeline>,
    pub supervisor: Arc<SupervisorCoordinator>,
    pub engine: Arc<EngineClient>,
    pub cms: Arc<CmsClient>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire up all components against the given database and settings
    pub fn new(db: SqlitePool, event_bus: EventBus, settings: Arc<Settings>) -> Result<Self> {
        let engine = Arc::new(EngineClient::new(&settings.engine)?);
        let llm = Arc::new(LlmClient::new(&settings.llm)?);
        let translator = Arc::new(TranslationClient::new(
            &settings.translation,
            settings.source_language(),
        )?);

        let lifecycle = Arc::new(ArticleLifecycle::new(
            db.clone(),
            event_bus.clone(),
            Arc::clone(&settings),
            Arc::clone(&engine),
            Arc::clone(&llm),
        ));

        let translation_pipeline = Arc::new(TranslationPipeline::new(
            db.clone(),
            event_bus.clone(),
            translator as Arc<dyn StructuralTranslator>,
            Arc::clone(&llm) as Arc<dyn IdiomaticReviewer>,
            settings.source_language(),
        ));

        let image_pipeline = Arc::new(ImagePipeline::new(db.clone(), event_bus.clone(), &settings)?);

        let supervisor = Arc::new(SupervisorCoordinator::new(
            db.clone(),
            event_bus.clone(),
            Arc::clone(&llm) as Arc<dyn QualityEvaluator>,
        ));

        let cms = Arc::new(CmsClient::new(&settings.cms)?);

        Ok(Self {
            db,
            event_bus,
            settings,
            lifecycle,
            translation_pipeline,
            image_pipeline,
            supervisor,
            engine,
            cms,
            startup_time: Utc::now(),
        })
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let image_storage = state.settings.image_storage_path();

    Router::new()
        .merge(api::articles::routes())
        .merge(api::webhook::routes())
        .merge(api::translations::routes())
        .merge(api::supervisor::routes())
        .merge(api::images::routes())
        .merge(api::publish::routes())
        .merge(api::settings::routes())
        .merge(api::health_routes())
        .route("/api/events", get(api::event_stream))
        .nest_service("/static/images", ServeDir::new(image_storage))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
