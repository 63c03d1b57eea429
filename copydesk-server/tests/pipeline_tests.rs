//! Unit-level tests for the pipelines, watchdog, and learning engine
//!
//! Providers and image backends are substituted through their capability
//! traits so failure behavior is deterministic.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use copydesk_common::config::Settings;
use copydesk_common::db::models::{
    Article, ArticleStatus, Recommendation, TranslationStatus, TriggerKind,
};
use copydesk_common::db::to_db_time;
use copydesk_common::events::{DeskEvent, EventBus};
use copydesk_common::{Error, Result};
use sqlx::SqlitePool;

use copydesk_server::db::articles::NewArticle;
use copydesk_server::db::contents::ContentPatch;
use copydesk_server::db::supervisor::NewDecision;
use copydesk_server::db::{articles, contents, profile, supervisor, translations};
use copydesk_server::services::engine_client::EngineClient;
use copydesk_server::services::image_backends::{
    ImageBackend, ImageJob, ImageJobStatus, ImageKind,
};
use copydesk_server::services::image_pipeline::ImagePipeline;
use copydesk_server::services::learning;
use copydesk_server::services::provider::{
    IdiomaticReviewer, ReviewedFields, SourceFields, StructuralTranslator, TranslatedFields,
};
use copydesk_server::services::translation_pipeline::TranslationPipeline;
use copydesk_server::services::watchdog::Watchdog;

async fn setup_db() -> SqlitePool {
    copydesk_common::db::init::init_memory_database()
        .await
        .expect("Should initialize in-memory database")
}

fn enabled_languages() -> BTreeMap<String, bool> {
    [("de", true), ("en", true), ("fr", true)]
        .into_iter()
        .map(|(lang, enabled)| (lang.to_string(), enabled))
        .collect()
}

async fn insert_generating_article(db: &SqlitePool, title: &str) -> Article {
    let new = NewArticle {
        id: Uuid::new_v4(),
        title: title.to_string(),
        trigger_kind: TriggerKind::Prompt,
        category: Some("technology".to_string()),
        languages: enabled_languages(),
        context_urls: Vec::new(),
        content_hash: format!("hash-{}", Uuid::new_v4()),
        max_retries: 3,
        timeout_at: Utc::now() + ChronoDuration::minutes(10),
    };
    articles::insert_article(db, &new).await.unwrap()
}

async fn insert_content(db: &SqlitePool, article: &Article) {
    contents::upsert_patch(
        db,
        article.id,
        &article.title,
        &ContentPatch {
            title: Some(article.title.clone()),
            lead: Some("A short lead.".to_string()),
            body: Some("<p>Canonical body</p>".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}

/// Drain all buffered events from a subscription
fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<DeskEvent>) -> Vec<DeskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Translation pipeline
// ============================================================================

struct FakeTranslator {
    failing_language: Option<String>,
}

#[async_trait]
impl StructuralTranslator for FakeTranslator {
    async fn translate_fields(
        &self,
        source: &SourceFields,
        target_language: &str,
    ) -> Result<TranslatedFields> {
        if self.failing_language.as_deref() == Some(target_language) {
            return Err(Error::ExternalUnavailable(format!(
                "Provider down for '{}'",
                target_language
            )));
        }
        Ok(TranslatedFields {
            title: Some(format!("{} [{}]", source.title, target_language)),
            lead: Some(format!("{} [{}]", source.lead, target_language)),
            body: Some(format!("{} [{}]", source.body, target_language)),
        })
    }
}

struct FakeReviewer;

#[async_trait]
impl IdiomaticReviewer for FakeReviewer {
    async fn review_fields(
        &self,
        _source: &SourceFields,
        translated: &TranslatedFields,
        _target_language: &str,
    ) -> Result<ReviewedFields> {
        Ok(ReviewedFields {
            title: None,
            lead: None,
            body: translated.body.as_ref().map(|b| format!("{} (polished)", b)),
        })
    }
}

#[tokio::test]
async fn test_translation_partial_failure_is_isolated() {
    let db = setup_db().await;
    let bus = EventBus::new(64);
    let article = insert_generating_article(&db, "Isolated failure").await;
    insert_content(&db, &article).await;

    let pipeline = TranslationPipeline::new(
        db.clone(),
        bus.clone(),
        Arc::new(FakeTranslator {
            failing_language: Some("fr".to_string()),
        }),
        Arc::new(FakeReviewer),
        "de",
    );

    pipeline
        .run(article.id, Some(vec!["en".to_string(), "fr".to_string()]))
        .await
        .unwrap();

    // English went through both stages
    let en = translations::get(&db, article.id, "en").await.unwrap().unwrap();
    assert_eq!(en.status, TranslationStatus::Reviewed);
    assert_eq!(
        en.body.as_deref(),
        Some("<p>Canonical body</p> [en] (polished)")
    );

    // French provider was down; the row keeps its prior state (absent)
    assert!(translations::get(&db, article.id, "fr").await.unwrap().is_none());

    // The article still reaches review once both branches finish
    let updated = articles::get_article(&db, article.id).await.unwrap().unwrap();
    assert_eq!(updated.status, ArticleStatus::Review);
}

#[tokio::test]
async fn test_translation_requires_content() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "Empty article").await;

    let pipeline = TranslationPipeline::new(
        db.clone(),
        EventBus::new(16),
        Arc::new(FakeTranslator {
            failing_language: None,
        }),
        Arc::new(FakeReviewer),
        "de",
    );

    let err = pipeline.run(article.id, None).await.unwrap_err();
    assert!(matches!(err, Error::ContentNotReady(_)));

    // The precondition failure must not have touched the status
    let unchanged = articles::get_article(&db, article.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, ArticleStatus::Generating);
}

#[tokio::test]
async fn test_translation_default_targets_exclude_source() {
    let db = setup_db().await;
    let bus = EventBus::new(64);
    let article = insert_generating_article(&db, "Default targets").await;
    insert_content(&db, &article).await;

    let pipeline = TranslationPipeline::new(
        db.clone(),
        bus,
        Arc::new(FakeTranslator {
            failing_language: None,
        }),
        Arc::new(FakeReviewer),
        "de",
    );

    pipeline.run(article.id, None).await.unwrap();

    let rows = translations::list_for_article(&db, article.id).await.unwrap();
    let languages: Vec<&str> = rows.iter().map(|t| t.language.as_str()).collect();
    assert_eq!(languages, vec!["en", "fr"]);
    assert!(rows.iter().all(|t| t.status == TranslationStatus::Reviewed));
}

// ============================================================================
// Image pipeline
// ============================================================================

struct FakeBackend {
    name: &'static str,
    available: bool,
    succeed: bool,
    submits: AtomicUsize,
}

impl FakeBackend {
    fn new(name: &'static str, available: bool, succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            available,
            succeed,
            submits: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ImageBackend for FakeBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn available(&self) -> bool {
        self.available
    }

    async fn submit(&self, _prompt: &str, _kind: ImageKind) -> Result<ImageJob> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(ImageJob {
            id: format!("{}-job", self.name),
        })
    }

    async fn poll(&self, _job: &ImageJob) -> Result<ImageJobStatus> {
        if self.succeed {
            Ok(ImageJobStatus::Completed)
        } else {
            Ok(ImageJobStatus::Failed)
        }
    }

    async fn fetch(&self, _job: &ImageJob) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }
}

fn image_pipeline(
    db: SqlitePool,
    bus: EventBus,
    backends: Vec<Arc<dyn ImageBackend>>,
) -> ImagePipeline {
    let storage = std::env::temp_dir().join(format!("copydesk-images-{}", Uuid::new_v4()));
    ImagePipeline::with_backends(
        db,
        bus,
        backends,
        storage,
        Duration::from_secs(5),
        Duration::from_millis(1),
    )
}

#[tokio::test]
async fn test_image_fallback_tries_next_backend_exactly_once() {
    let db = setup_db().await;
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();

    let article = insert_generating_article(&db, "Needs image").await;
    insert_content(&db, &article).await;

    let failing = FakeBackend::new("first", true, false);
    let succeeding = FakeBackend::new("second", true, true);
    let pipeline = image_pipeline(
        db.clone(),
        bus,
        vec![failing.clone(), succeeding.clone()],
    );

    pipeline
        .run(article.id, "a lighthouse at dawn".to_string(), ImageKind::Photo)
        .await
        .unwrap();

    assert_eq!(failing.submits.load(Ordering::SeqCst), 1);
    assert_eq!(succeeding.submits.load(Ordering::SeqCst), 1);

    let content = contents::get_by_article(&db, article.id).await.unwrap().unwrap();
    let image_url = content.image_url.unwrap();
    assert!(image_url.starts_with("/static/images/"));
    assert_eq!(content.image_prompt.as_deref(), Some("a lighthouse at dawn"));

    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, DeskEvent::ImageGenerating { .. })));
    assert!(events.iter().any(|e| matches!(e, DeskEvent::ImageReady { .. })));
}

#[tokio::test]
async fn test_image_success_never_reaches_fallback() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "First try").await;
    insert_content(&db, &article).await;

    let first = FakeBackend::new("first", true, true);
    let second = FakeBackend::new("second", true, true);
    let pipeline = image_pipeline(db.clone(), EventBus::new(16), vec![first.clone(), second.clone()]);

    pipeline
        .run(article.id, "prompt".to_string(), ImageKind::Illustration)
        .await
        .unwrap();

    assert_eq!(first.submits.load(Ordering::SeqCst), 1);
    assert_eq!(second.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_image_exhaustion_emits_failed_and_keeps_status() {
    let db = setup_db().await;
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();

    let article = insert_generating_article(&db, "No image today").await;
    insert_content(&db, &article).await;

    let unavailable = FakeBackend::new("offline", false, true);
    let failing = FakeBackend::new("broken", true, false);
    let pipeline = image_pipeline(db.clone(), bus, vec![unavailable.clone(), failing.clone()]);

    pipeline
        .run(article.id, "prompt".to_string(), ImageKind::Illustration)
        .await
        .unwrap();

    // Unavailable backends are skipped without a submit
    assert_eq!(unavailable.submits.load(Ordering::SeqCst), 0);
    assert_eq!(failing.submits.load(Ordering::SeqCst), 1);

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(e, DeskEvent::ImageFailed { .. })));

    // Image failure is a side-pipeline outcome; the article is untouched
    let unchanged = articles::get_article(&db, article.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, ArticleStatus::Generating);
    assert!(contents::get_by_article(&db, article.id)
        .await
        .unwrap()
        .unwrap()
        .image_url
        .is_none());
}

// ============================================================================
// Watchdog
// ============================================================================

fn watchdog_settings() -> Settings {
    let mut settings = Settings::default();
    settings.engine.url = "http://127.0.0.1:9".to_string();
    settings.engine.trigger_timeout_secs = 1;
    settings
}

fn watchdog(db: &SqlitePool, bus: &EventBus, settings: &Settings) -> Watchdog {
    let engine = Arc::new(EngineClient::new(&settings.engine).unwrap());
    Watchdog::new(db.clone(), bus.clone(), engine, settings)
}

async fn expire_deadline(db: &SqlitePool, article_id: Uuid) {
    sqlx::query("UPDATE articles SET timeout_at = ? WHERE id = ?")
        .bind(to_db_time(Utc::now() - ChronoDuration::minutes(5)))
        .bind(article_id.to_string())
        .execute(db)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_watchdog_retries_with_extended_deadline() {
    let db = setup_db().await;
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let settings = watchdog_settings();

    let article = insert_generating_article(&db, "Stalled").await;
    expire_deadline(&db, article.id).await;

    let processed = watchdog(&db, &bus, &settings).sweep().await.unwrap();
    assert_eq!(processed, 1);

    let updated = articles::get_article(&db, article.id).await.unwrap().unwrap();
    assert_eq!(updated.status, ArticleStatus::Generating);
    assert_eq!(updated.retry_count, 1);
    assert_eq!(updated.last_error.as_deref(), Some("Timeout (attempt 1/3)"));
    assert!(updated.timeout_at.unwrap() > Utc::now());

    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, DeskEvent::ArticleRetry { retry: 1, .. })));
}

#[tokio::test]
async fn test_watchdog_times_out_exactly_once_after_exhaustion() {
    let db = setup_db().await;
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let settings = watchdog_settings();

    let article = insert_generating_article(&db, "Exhausted").await;
    sqlx::query("UPDATE articles SET retry_count = max_retries WHERE id = ?")
        .bind(article.id.to_string())
        .execute(&db)
        .await
        .unwrap();
    expire_deadline(&db, article.id).await;

    let wd = watchdog(&db, &bus, &settings);
    assert_eq!(wd.sweep().await.unwrap(), 1);

    let updated = articles::get_article(&db, article.id).await.unwrap().unwrap();
    assert_eq!(updated.status, ArticleStatus::Timeout);
    assert_eq!(updated.last_error.as_deref(), Some("Max retries (3) exceeded"));
    assert!(updated.timeout_at.is_none());

    // A second sweep finds nothing; the transition fired exactly once
    assert_eq!(wd.sweep().await.unwrap(), 0);

    let timeouts = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DeskEvent::ArticleTimeout { .. }))
        .count();
    assert_eq!(timeouts, 1);
}

#[tokio::test]
async fn test_watchdog_retry_count_never_exceeds_max() {
    let db = setup_db().await;
    let bus = EventBus::new(64);
    let settings = watchdog_settings();
    let wd = watchdog(&db, &bus, &settings);

    let article = insert_generating_article(&db, "Repeatedly stalled").await;

    for expected_retry in 1..=3 {
        expire_deadline(&db, article.id).await;
        assert_eq!(wd.sweep().await.unwrap(), 1);
        let updated = articles::get_article(&db, article.id).await.unwrap().unwrap();
        assert_eq!(updated.retry_count, expected_retry);
        assert!(updated.retry_count <= updated.max_retries);
        assert_eq!(updated.status, ArticleStatus::Generating);
    }

    // The fourth stall exhausts the budget
    expire_deadline(&db, article.id).await;
    assert_eq!(wd.sweep().await.unwrap(), 1);
    let finished = articles::get_article(&db, article.id).await.unwrap().unwrap();
    assert_eq!(finished.status, ArticleStatus::Timeout);
    assert_eq!(finished.retry_count, 3);
}

#[tokio::test]
async fn test_watchdog_ignores_articles_with_future_deadline() {
    let db = setup_db().await;
    let settings = watchdog_settings();
    let wd = watchdog(&db, &EventBus::new(16), &settings);

    insert_generating_article(&db, "Still on time").await;
    assert_eq!(wd.sweep().await.unwrap(), 0);
}

// ============================================================================
// Learning feedback engine
// ============================================================================

#[tokio::test]
async fn test_approval_reinforces_present_tags_and_decays_others() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "Tagged article").await;

    for label in ["a", "b", "c"] {
        profile::upsert_trait(&db, label, "seeded", 0.5).await.unwrap();
    }

    supervisor::append_decision(
        &db,
        article.id,
        &NewDecision {
            recommendation: Recommendation::Approve,
            justification: "Looks good".to_string(),
            score: 90,
            style_tags: vec!["a".to_string(), "b".to_string()],
        },
    )
    .await
    .unwrap();

    learning::apply_editor_decision(&db, &article, Recommendation::Approve, None)
        .await
        .unwrap();

    let traits: BTreeMap<String, (f64, i64)> = profile::list_traits(&db)
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.label, (t.weight, t.evidence)))
        .collect();

    assert!((traits["a"].0 - 0.52).abs() < 1e-9);
    assert_eq!(traits["a"].1, 1);
    assert!((traits["b"].0 - 0.52).abs() < 1e-9);
    assert_eq!(traits["b"].1, 1);
    assert!((traits["c"].0 - 0.495).abs() < 1e-9);
    assert_eq!(traits["c"].1, 0);
}

#[tokio::test]
async fn test_weight_bounds_are_clamped() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "Clamped").await;

    profile::upsert_trait(&db, "ceiling", "near max", 0.99).await.unwrap();
    profile::upsert_trait(&db, "floor", "at min", 0.1).await.unwrap();

    supervisor::append_decision(
        &db,
        article.id,
        &NewDecision {
            recommendation: Recommendation::Approve,
            justification: "Fine".to_string(),
            score: 80,
            style_tags: vec!["ceiling".to_string()],
        },
    )
    .await
    .unwrap();

    learning::apply_editor_decision(&db, &article, Recommendation::Approve, None)
        .await
        .unwrap();

    let traits: BTreeMap<String, f64> = profile::list_traits(&db)
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.label, t.weight))
        .collect();

    assert!((traits["ceiling"] - 1.0).abs() < 1e-9);
    assert!((traits["floor"] - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_tag_enters_profile_at_seed_weight() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "New tag").await;

    supervisor::append_decision(
        &db,
        article.id,
        &NewDecision {
            recommendation: Recommendation::Approve,
            justification: "Fine".to_string(),
            score: 75,
            style_tags: vec!["brand-new".to_string()],
        },
    )
    .await
    .unwrap();

    learning::apply_editor_decision(&db, &article, Recommendation::Approve, None)
        .await
        .unwrap();

    let traits = profile::list_traits(&db).await.unwrap();
    assert_eq!(traits.len(), 1);
    assert_eq!(traits[0].label, "brand-new");
    assert!((traits[0].weight - 0.5).abs() < 1e-9);
    assert_eq!(traits[0].evidence, 1);
}

#[tokio::test]
async fn test_topic_approval_rate_moves_as_ema() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "Topic stats").await;

    // New topic seeds at 0.0; first approval lands at 0.2
    learning::apply_editor_decision(&db, &article, Recommendation::Approve, None)
        .await
        .unwrap();
    let ranking = profile::get_ranking(&db, "technology").await.unwrap().unwrap();
    assert_eq!(ranking.article_count, 1);
    assert!((ranking.approval_rate - 0.2).abs() < 1e-9);

    // Second approval: 0.2 * 0.8 + 0.2 = 0.36
    learning::apply_editor_decision(&db, &article, Recommendation::Approve, None)
        .await
        .unwrap();
    let ranking = profile::get_ranking(&db, "technology").await.unwrap().unwrap();
    assert_eq!(ranking.article_count, 2);
    assert!((ranking.approval_rate - 0.36).abs() < 1e-9);

    // A rejection decays: 0.36 * 0.8 = 0.288
    learning::apply_editor_decision(&db, &article, Recommendation::Reject, None)
        .await
        .unwrap();
    let ranking = profile::get_ranking(&db, "technology").await.unwrap().unwrap();
    assert!((ranking.approval_rate - 0.288).abs() < 1e-9);
}

#[tokio::test]
async fn test_deviation_flag_and_stats() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "Disagreement").await;

    supervisor::append_decision(
        &db,
        article.id,
        &NewDecision {
            recommendation: Recommendation::Revise,
            justification: "Needs work".to_string(),
            score: 55,
            style_tags: Vec::new(),
        },
    )
    .await
    .unwrap();

    // Editor approves against the automated recommendation
    learning::apply_editor_decision(&db, &article, Recommendation::Approve, Some("Ship it"))
        .await
        .unwrap();

    let latest = supervisor::latest_for_article(&db, article.id)
        .await
        .unwrap()
        .unwrap();
    assert!(latest.deviation);
    assert_eq!(latest.editor_decision, Some(Recommendation::Approve));
    assert_eq!(latest.editor_feedback.as_deref(), Some("Ship it"));
    // The automated fields stay immutable
    assert_eq!(latest.recommendation, Recommendation::Revise);
    assert_eq!(latest.score, 55);

    let stats = learning::deviation_stats(&db).await.unwrap();
    assert_eq!(stats.total_decisions, 1);
    assert_eq!(stats.deviations, 1);
    assert!((stats.deviation_rate - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_decision_without_supervisor_record_updates_only_topics() {
    let db = setup_db().await;
    let article = insert_generating_article(&db, "No evaluation yet").await;

    // No supervisor decision exists; nothing to attach to, no deviation
    learning::apply_editor_decision(&db, &article, Recommendation::Approve, None)
        .await
        .unwrap();

    assert!(supervisor::latest_for_article(&db, article.id)
        .await
        .unwrap()
        .is_none());
    let stats = learning::deviation_stats(&db).await.unwrap();
    assert_eq!(stats.total_decisions, 0);

    let ranking = profile::get_ranking(&db, "technology").await.unwrap().unwrap();
    assert_eq!(ranking.article_count, 1);
}
