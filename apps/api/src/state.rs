use std::sync::Arc;

use crate::cleanup::CleanupScheduler;
use crate::export::orchestrator::ExportService;

/// Shared application state injected into all route handlers via Axum
/// extractors. The scheduler's start/stop lifecycle is owned by `main`;
/// handlers only borrow it for the explicit cleanup triggers.
#[derive(Clone)]
pub struct AppState {
    pub exports: Arc<ExportService>,
    pub cleanup: Arc<CleanupScheduler>,
}
