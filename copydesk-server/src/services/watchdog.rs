//! Generation queue watchdog
//!
//! Periodic sweep over articles stuck in `generating` past their deadline.
//! Articles with retries left get a pushed-out deadline and a re-issued
//! engine trigger; exhausted articles transition to `timeout` exactly once.
//! The loop runs for the process lifetime and never exits on error.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use copydesk_common::config::Settings;
use copydesk_common::db::models::Article;
use copydesk_common::events::{DeskEvent, EventBus};
use copydesk_common::Result;
use sqlx::SqlitePool;

use crate::db::articles;

use super::engine_client::EngineClient;

pub struct Watchdog {
    db: SqlitePool,
    bus: EventBus,
    engine: Arc<EngineClient>,
    interval: Duration,
    retry_window: ChronoDuration,
}

/// Deferred side effects of one sweep, fired after the batch commits
enum SweepAction {
    Retry(Article, i64),
    Timeout(Article),
}

impl Watchdog {
    pub fn new(
        db: SqlitePool,
        bus: EventBus,
        engine: Arc<EngineClient>,
        settings: &Settings,
    ) -> Self {
        Self {
            db,
            bus,
            engine,
            interval: Duration::from_secs(settings.queue.watchdog_interval_secs),
            retry_window: ChronoDuration::seconds(settings.queue.retry_window_secs),
        }
    }

    /// Run until the shutdown token fires. Sweep errors are logged and
    /// swallowed; the watchdog itself never dies.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval = ?self.interval, "Watchdog started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Watchdog shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => {}
                        Ok(processed) => {
                            tracing::info!("Watchdog processed {} timed-out articles", processed);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Watchdog sweep failed");
                        }
                    }
                }
            }
        }
    }

    /// One sweep. Returns the number of articles processed.
    ///
    /// Database updates for the sweep commit as one batch; a fault on one
    /// row is logged and skipped without aborting the others. Triggers and
    /// events fire after the commit.
    pub async fn sweep(&self) -> Result<usize> {
        let expired = articles::expired_generating(&self.db, Utc::now()).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut actions: Vec<SweepAction> = Vec::new();
        let mut tx = self.db.begin().await?;

        for article in expired {
            if article.retry_count < article.max_retries {
                let retry = article.retry_count + 1;
                let last_error = format!("Timeout (attempt {}/{})", retry, article.max_retries);
                let deadline = Utc::now() + self.retry_window;

                match articles::record_retry(&mut tx, article.id, retry, &last_error, deadline)
                    .await
                {
                    Ok(true) => actions.push(SweepAction::Retry(article, retry)),
                    Ok(false) => {
                        // Raced another transition; the row is no longer ours
                        tracing::debug!(article_id = %article.id, "Retry skipped, status changed");
                    }
                    Err(e) => {
                        tracing::error!(article_id = %article.id, error = %e, "Retry update failed");
                    }
                }
            } else {
                let last_error = format!("Max retries ({}) exceeded", article.max_retries);
                match articles::mark_timeout(&mut tx, article.id, &last_error).await {
                    Ok(true) => actions.push(SweepAction::Timeout(article)),
                    Ok(false) => {
                        tracing::debug!(article_id = %article.id, "Timeout skipped, status changed");
                    }
                    Err(e) => {
                        tracing::error!(article_id = %article.id, error = %e, "Timeout update failed");
                    }
                }
            }
        }

        tx.commit().await?;

        let processed = actions.len();
        for action in actions {
            match action {
                SweepAction::Retry(article, retry) => {
                    tracing::info!(
                        article_id = %article.id,
                        attempt = retry,
                        "Retrying stalled generation"
                    );
                    // Re-issue the trigger; the engine is responsible for
                    // not duplicating in-flight work
                    self.engine
                        .trigger_generation(
                            article.id,
                            article.trigger_kind,
                            "",
                            article.category.as_deref(),
                            &article.languages,
                            &[],
                            None,
                        )
                        .await;

                    self.bus.emit(DeskEvent::ArticleRetry {
                        id: article.id,
                        title: article.title,
                        retry,
                    });
                }
                SweepAction::Timeout(article) => {
                    tracing::warn!(
                        article_id = %article.id,
                        retries = article.max_retries,
                        "Article timed out after exhausting retries"
                    );
                    self.bus.emit(DeskEvent::ArticleTimeout {
                        id: article.id,
                        title: article.title,
                    });
                }
            }
        }

        Ok(processed)
    }
}
