//! Integration tests for the copydesk-server API
//!
//! Drives the full router against an in-memory database. External
//! collaborators (workflow engine, providers) point at unreachable
//! endpoints; their calls are best-effort and fail fast.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

use copydesk_common::config::Settings;
use copydesk_common::events::EventBus;
use copydesk_server::{build_router, AppState};

/// Test helper: fresh state against an in-memory database
async fn setup_state_with(tweak: impl FnOnce(&mut Settings)) -> AppState {
    let db = copydesk_common::db::init::init_memory_database()
        .await
        .expect("Should initialize in-memory database");

    let mut settings = Settings::default();
    // Unreachable engine: triggers fail fast and articles stay `generating`
    settings.engine.url = "http://127.0.0.1:9".to_string();
    settings.engine.trigger_timeout_secs = 1;
    settings.image_storage_path = Some(std::env::temp_dir().join("copydesk-test-images"));
    tweak(&mut settings);

    AppState::new(db, EventBus::new(64), Arc::new(settings)).expect("Should build state")
}

async fn setup_app() -> axum::Router {
    build_router(setup_state_with(|_| {}).await)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Test helper: create an article, return its JSON representation
async fn create_article(app: &axum::Router, text: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/articles",
            json!({ "trigger_kind": "prompt", "text": text }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    extract_json(response.into_body()).await
}

/// Test helper: deliver an engine callback
async fn deliver_callback(app: &axum::Router, payload: Value) -> StatusCode {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/webhook/engine", payload))
        .await
        .unwrap();
    response.status()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "copydesk-server");
    assert!(body["version"].is_string());
}

// ============================================================================
// Creation and duplicate detection
// ============================================================================

#[tokio::test]
async fn test_create_article_starts_generating() {
    let app = setup_app().await;

    let article = create_article(&app, "AI in healthcare").await;
    assert_eq!(article["status"], "generating");
    assert_eq!(article["title"], "AI in healthcare");
    assert_eq!(article["retry_count"], 0);
    assert!(article["content_hash"].is_string());
    assert!(article["timeout_at"].is_string());
}

#[tokio::test]
async fn test_duplicate_submission_rejected_with_existing_id() {
    let app = setup_app().await;

    let first = create_article(&app, "AI in healthcare").await;

    // Same text modulo whitespace/case still collides
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/articles",
            json!({ "trigger_kind": "prompt", "text": "  ai IN healthcare " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "DUPLICATE_CONTENT");
    assert_eq!(body["error"]["existing_id"], first["id"]);
}

#[tokio::test]
async fn test_cancelled_article_is_resubmittable() {
    let app = setup_app().await;

    let first = create_article(&app, "Quantum computing basics").await;
    let id = first["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/cancel", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Fingerprint is released by the cancelled status
    let second = create_article(&app, "Quantum computing basics").await;
    assert_ne!(second["id"], first["id"]);
}

#[tokio::test]
async fn test_bulk_submission_skips_duplicates() {
    let app = setup_app().await;

    create_article(&app, "Topic one").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/articles/bulk",
            json!({ "topics": ["Topic one", "Topic two"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["created"].as_array().unwrap().len(), 1);
    assert_eq!(body["created"][0]["title"], "Topic two");
}

#[tokio::test]
async fn test_bulk_submission_limits() {
    let app = setup_app().await;

    let too_many: Vec<String> = (0..51).map(|i| format!("Topic {}", i)).collect();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/articles/bulk",
            json!({ "topics": too_many }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/articles/bulk", json!({ "topics": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_submission_feature_gated() {
    let state = setup_state_with(|s| s.features.bulk_input = false).await;
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/articles/bulk",
            json!({ "topics": ["Topic"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Engine callback
// ============================================================================

#[tokio::test]
async fn test_callback_creates_content_and_moves_status() {
    let app = setup_app().await;

    let article = create_article(&app, "AI in healthcare").await;
    let id = article["id"].as_str().unwrap();

    let status = deliver_callback(
        &app,
        json!({
            "articleId": id,
            "status": "review",
            "title": "AI in Healthcare: An Overview",
            "lead": "What changes for clinics",
            "body": "<p>Generated article body</p>",
            "seoTitle": "AI in healthcare",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/articles/{}", id)))
        .await
        .unwrap();
    let detail = extract_json(response.into_body()).await;

    assert_eq!(detail["status"], "review");
    assert_eq!(detail["title"], "AI in Healthcare: An Overview");
    assert_eq!(detail["content"]["body"], "<p>Generated article body</p>");
    assert_eq!(detail["content"]["seo_title"], "AI in healthcare");
    // Deadline only exists while generating
    assert!(detail["timeout_at"].is_null());
}

#[tokio::test]
async fn test_callback_unknown_article_is_404() {
    let app = setup_app().await;

    let status = deliver_callback(
        &app,
        json!({
            "articleId": "00000000-0000-0000-0000-000000000001",
            "status": "review",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_upserts_translations_and_supervisor() {
    let app = setup_app().await;

    let article = create_article(&app, "AI in healthcare").await;
    let id = article["id"].as_str().unwrap();

    let status = deliver_callback(
        &app,
        json!({
            "articleId": id,
            "status": "review",
            "body": "<p>Body</p>",
            "translations": {
                "en": { "title": "AI in healthcare", "body": "<p>Body EN</p>", "status": "machine_translated" }
            },
            "supervisor": {
                "recommendation": "approve",
                "justification": "Solid sourcing and structure.",
                "score": 87,
                "tags": ["factual", "accessible"]
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/articles/{}", id)))
        .await
        .unwrap();
    let detail = extract_json(response.into_body()).await;

    assert_eq!(detail["translations"][0]["language"], "en");
    assert_eq!(detail["translations"][0]["status"], "machine_translated");
    assert_eq!(detail["supervisor"]["score"], 87);
    assert_eq!(detail["supervisor"]["recommendation"], "approve");
    assert_eq!(detail["supervisor"]["deviation"], false);
}

#[tokio::test]
async fn test_callback_token_validation() {
    let state = setup_state_with(|s| s.engine.webhook_token = Some("secret".to_string())).await;
    let app = build_router(state);

    let article = create_article(&app, "Guarded article").await;
    let id = article["id"].as_str().unwrap();
    let payload = json!({ "articleId": id, "status": "review" });

    // Missing token
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/webhook/engine", payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct token
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhook/engine")
        .header("content-type", "application/json")
        .header("x-webhook-token", "secret")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_late_callback_keeps_terminal_status() {
    let app = setup_app().await;

    let article = create_article(&app, "Late callback article").await;
    let id = article["id"].as_str().unwrap();

    deliver_callback(
        &app,
        json!({ "articleId": id, "status": "review", "body": "<p>v1</p>" }),
    )
    .await;

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/approve", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The engine's job finishes late; content is kept for audit, the
    // published status is not regressed
    let status = deliver_callback(
        &app,
        json!({ "articleId": id, "status": "generating", "body": "<p>v2</p>" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/articles/{}", id)))
        .await
        .unwrap();
    let detail = extract_json(response.into_body()).await;
    assert_eq!(detail["status"], "published");
    assert_eq!(detail["content"]["body"], "<p>v2</p>");
}

// ============================================================================
// Editor transitions
// ============================================================================

#[tokio::test]
async fn test_approve_from_review() {
    let app = setup_app().await;

    let article = create_article(&app, "Approvable article").await;
    let id = article["id"].as_str().unwrap();
    deliver_callback(&app, json!({ "articleId": id, "status": "review", "body": "<p>b</p>" }))
        .await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/articles/{}/approve", id),
            json!({ "feedback": "Good piece" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "published");
}

#[tokio::test]
async fn test_approve_rejected_from_terminal_status() {
    let app = setup_app().await;

    let article = create_article(&app, "Cancelled then approved").await;
    let id = article["id"].as_str().unwrap();

    app.clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/cancel", id)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/approve", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");
}

#[tokio::test]
async fn test_revise_returns_to_generating() {
    let app = setup_app().await;

    let article = create_article(&app, "Needs work").await;
    let id = article["id"].as_str().unwrap();
    deliver_callback(&app, json!({ "articleId": id, "status": "review", "body": "<p>b</p>" }))
        .await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/articles/{}/revise", id),
            json!({ "feedback": "Needs more sources" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "generating");
    assert!(body["timeout_at"].is_string());
}

#[tokio::test]
async fn test_cancel_guards() {
    let app = setup_app().await;

    // Unknown article
    let response = app
        .clone()
        .oneshot(empty_request(
            "PATCH",
            "/api/articles/00000000-0000-0000-0000-000000000001/cancel",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Review articles cannot be cancelled
    let article = create_article(&app, "In review").await;
    let id = article["id"].as_str().unwrap();
    deliver_callback(&app, json!({ "articleId": id, "status": "review", "body": "<p>b</p>" }))
        .await;

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/cancel", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_pause_resume_cycle() {
    let app = setup_app().await;

    let article = create_article(&app, "Pausable").await;
    let id = article["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/pause", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "paused");
    assert!(body["timeout_at"].is_null());

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/resume", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "generating");
    assert!(body["timeout_at"].is_string());

    // Pausing twice is a guard violation
    app.clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/pause", id)))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/pause", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_retry_resets_counters() {
    let app = setup_app().await;

    let article = create_article(&app, "Stalled article").await;
    let id = article["id"].as_str().unwrap();

    // The engine reports a hard failure
    deliver_callback(&app, json!({ "articleId": id, "status": "failed" })).await;

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/retry", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "generating");
    assert_eq!(body["retry_count"], 0);
    assert!(body["last_error"].is_null());
    assert!(body["timeout_at"].is_string());
}

#[tokio::test]
async fn test_retry_rejected_while_active() {
    let app = setup_app().await;

    let article = create_article(&app, "Active article").await;
    let id = article["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/retry", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ============================================================================
// Listing and stats
// ============================================================================

#[tokio::test]
async fn test_list_articles_with_status_filter() {
    let app = setup_app().await;

    let a = create_article(&app, "First").await;
    create_article(&app, "Second").await;
    let id = a["id"].as_str().unwrap();
    app.clone()
        .oneshot(empty_request("PATCH", &format!("/api/articles/{}/cancel", id)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/articles?status=generating"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["title"], "Second");

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/articles?status=bogus"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_queue_stats_cover_all_statuses() {
    let app = setup_app().await;

    create_article(&app, "Counting").await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/articles/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["generating"], 1);
    for field in [
        "translating",
        "review",
        "published",
        "failed",
        "timeout",
        "paused",
        "cancelled",
    ] {
        assert_eq!(body[field], 0, "missing zero count for {}", field);
    }
}

// ============================================================================
// Pipelines: synchronous preconditions
// ============================================================================

#[tokio::test]
async fn test_translation_run_requires_content() {
    let app = setup_app().await;

    let article = create_article(&app, "No content yet").await;
    let id = article["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/api/translations/{}/run", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "CONTENT_NOT_READY");
}

#[tokio::test]
async fn test_supervisor_evaluation_requires_content() {
    let app = setup_app().await;

    let article = create_article(&app, "No content yet").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/supervisor/evaluate",
            json!({ "article_id": article["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_image_generation_requires_prompt() {
    let app = setup_app().await;

    let article = create_article(&app, "No prompt").await;
    let id = article["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/api/images/{}/generate", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_publish_feature_gated() {
    let app = setup_app().await;

    let article = create_article(&app, "Unpublishable").await;
    let id = article["id"].as_str().unwrap();

    // Publishing is off by default
    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/api/publish/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Runtime settings
// ============================================================================

#[tokio::test]
async fn test_settings_expose_runtime_values_without_secrets() {
    let state = setup_state_with(|s| {
        s.engine.webhook_token = Some("secret".to_string());
        s.llm.api_key = Some("llm-key".to_string());
    })
    .await;
    let app = build_router(state);

    let response = app
        .oneshot(empty_request("GET", "/api/settings"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["queue"]["watchdog_interval_secs"], 60);
    assert_eq!(body["queue"]["retry_window_secs"], 600);
    assert_eq!(body["queue"]["max_retries"], 3);
    assert_eq!(body["features"]["bulk_input"], true);
    assert_eq!(body["source_language"], "de");
    // No secret ever leaves the process
    let rendered = body.to_string();
    assert!(!rendered.contains("secret"));
    assert!(!rendered.contains("llm-key"));
}

// ============================================================================
// Tonality profile management
// ============================================================================

#[tokio::test]
async fn test_tonality_profile_crud() {
    let app = setup_app().await;

    // Weight is clamped into [0.1, 1.0] on write
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/supervisor/tonality",
            json!({ "label": "factual", "value": "set by editor", "weight": 5.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/supervisor/tonality"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body[0]["label"], "factual");
    assert_eq!(body[0]["weight"], 1.0);
    let trait_id = body[0]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/supervisor/tonality/{}", trait_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/supervisor/tonality/{}", trait_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
