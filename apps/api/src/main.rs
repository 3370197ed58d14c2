mod cleanup;
mod config;
mod db;
mod errors;
mod export;
mod models;
mod render;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cleanup::CleanupScheduler;
use crate::config::Config;
use crate::db::create_pool;
use crate::export::orchestrator::ExportService;
use crate::export::quota::SubscriptionService;
use crate::export::store::{ExportStore, PgExportStore};
use crate::render::{ArtifactRenderer, ResumeRenderer};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resumeforge API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!().run(&pool).await?;

    // Export subsystem wiring
    let files = Arc::new(FileStore::new(
        config.export.export_base_path.clone(),
        config.export.temp_export_path.clone(),
    )?);
    info!(
        "Export storage ready at {}",
        config.export.export_base_path.display()
    );

    let store: Arc<dyn ExportStore> = Arc::new(PgExportStore::new(pool.clone()));
    let renderer: Arc<dyn ResumeRenderer> = Arc::new(ArtifactRenderer);
    let quota = Arc::new(SubscriptionService::new(
        store.clone(),
        config.export.clone(),
    ));
    let exports = Arc::new(ExportService::new(
        store.clone(),
        files.clone(),
        renderer,
        quota,
        config.export.clone(),
    ));

    // Cleanup scheduler lifecycle is owned here, not by a global
    let scheduler = Arc::new(CleanupScheduler::new(
        store,
        files,
        config.export.clone(),
    ));
    if config.export.auto_cleanup_enabled {
        scheduler.start();
    }

    // Build router
    let state = AppState {
        exports,
        cleanup: scheduler.clone(),
    };
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Received shutdown signal");
}
