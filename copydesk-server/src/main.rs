//! copydesk-server - editorial pipeline orchestration service
//!
//! Coordinates article generation through an external workflow engine,
//! per-language translation, image generation, automated quality review,
//! and the editor feedback loop.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use copydesk_common::config::Settings;
use copydesk_common::events::EventBus;
use copydesk_server::services::watchdog::Watchdog;
use copydesk_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting copydesk-server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = Arc::new(Settings::load()?);

    let db_path = settings.database_path();
    info!("Database: {}", db_path.display());
    let db = copydesk_common::db::init_database(&db_path).await?;

    let event_bus = EventBus::new(256);

    let state = AppState::new(db.clone(), event_bus.clone(), Arc::clone(&settings))?;

    // The watchdog repairs stalled generation for the process lifetime
    let shutdown = CancellationToken::new();
    let watchdog = Watchdog::new(
        db.clone(),
        event_bus.clone(),
        Arc::clone(&state.engine),
        &settings,
    );
    let watchdog_handle = tokio::spawn(watchdog.run(shutdown.clone()));

    let app = copydesk_server::build_router(state);

    let bind_address = settings.bind_address().to_string();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = watchdog_handle.await;
    info!("copydesk-server stopped");

    Ok(())
}
