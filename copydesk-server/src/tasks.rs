//! Detached background work
//!
//! All follow-on work spawned from request handlers (engine trigger,
//! translation pipeline, image pipeline, evaluation, embedding, publishing)
//! goes through this single submission point so error handling is uniform:
//! failures are logged, never propagated to the originating request.

use copydesk_common::Result;
use std::future::Future;
use tokio::task::JoinHandle;

/// Spawn a named background task whose errors are logged instead of lost
pub fn spawn_logged<F>(task_name: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::debug!(task = task_name, "Background task started");
        match fut.await {
            Ok(()) => {
                tracing::debug!(task = task_name, "Background task completed");
            }
            Err(e) => {
                tracing::error!(task = task_name, error = %e, "Background task failed");
            }
        }
    })
}
