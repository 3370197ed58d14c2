pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::export::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Export API
        .route("/api/v1/export/bulk", post(handlers::handle_create_bulk_export))
        .route(
            "/api/v1/export/bulk/:bulk_export_id/download",
            get(handlers::handle_download_bulk_export),
        )
        .route(
            "/api/v1/export/bulk/:bulk_export_id/status",
            get(handlers::handle_bulk_export_status),
        )
        .route("/api/v1/export/history", get(handlers::handle_export_history))
        .route("/api/v1/export/limits", get(handlers::handle_export_limits))
        .route(
            "/api/v1/export/cleanup-expired",
            post(handlers::handle_cleanup_expired),
        )
        .route(
            "/api/v1/export/admin/cleanup-all-expired",
            post(handlers::handle_admin_cleanup_expired),
        )
        .route("/api/v1/export/admin/stats", get(handlers::handle_admin_stats))
        .route(
            "/api/v1/export/admin/purge-user/:user_id",
            post(handlers::handle_admin_purge_user),
        )
        .route("/api/v1/export/:resume_id", post(handlers::handle_create_export))
        .route(
            "/api/v1/export/:export_id/download",
            get(handlers::handle_download_export),
        )
        .route(
            "/api/v1/export/:export_id/status",
            get(handlers::handle_export_status),
        )
        .route(
            "/api/v1/export/:export_id",
            delete(handlers::handle_delete_export),
        )
        .with_state(state)
}
