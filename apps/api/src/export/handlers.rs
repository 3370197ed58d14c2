//! HTTP handlers for the export API. Handlers stay thin: validate the
//! request shape, call the orchestrator, and hand long-running work to a
//! spawned task so the response returns immediately.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::errors::{AppError, ExportError};
use crate::models::export::{
    BulkExportRequest, BulkExportResponse, CleanupResult, ExportHistoryResponse, ExportRequest,
    ExportResponse, ExportStatusView,
};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub user_id: Uuid,
    pub limit: Option<i64>,
    pub include_expired: Option<bool>,
}

// ── Single exports ──────────────────────────────────────────────────────

/// POST /api/v1/export/:resume_id
pub async fn handle_create_export(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, AppError> {
    let (response, task) = state
        .exports
        .create_export(resume_id, request.user_id, &request)
        .await?;

    // Rendering happens off the request path; clients poll the status
    // endpoint until the record reaches a terminal state.
    let exports = state.exports.clone();
    tokio::spawn(async move { exports.process_export(task).await });

    Ok(Json(response))
}

/// GET /api/v1/export/:export_id/download
pub async fn handle_download_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Response, AppError> {
    let info = state
        .exports
        .get_download_info(&export_id, params.user_id)
        .await?;
    serve_file(&info.path, &info.filename, info.media_type).await
}

/// GET /api/v1/export/:export_id/status
pub async fn handle_export_status(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ExportStatusView>, AppError> {
    let view = state
        .exports
        .get_status(&export_id, params.user_id)
        .await?;
    Ok(Json(view))
}

/// DELETE /api/v1/export/:export_id
pub async fn handle_delete_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .exports
        .delete_export(&export_id, params.user_id)
        .await?;
    Ok(Json(json!({ "message": "Export deleted successfully" })))
}

// ── Bulk exports ────────────────────────────────────────────────────────

/// POST /api/v1/export/bulk
pub async fn handle_create_bulk_export(
    State(state): State<AppState>,
    Json(request): Json<BulkExportRequest>,
) -> Result<Json<BulkExportResponse>, AppError> {
    if request.resume_ids.is_empty() {
        return Err(AppError::Validation(
            "resume_ids must not be empty".to_string(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    if !request.resume_ids.iter().all(|id| seen.insert(id)) {
        return Err(AppError::Validation(
            "Duplicate resume IDs are not allowed".to_string(),
        ));
    }

    let (response, task) = state
        .exports
        .create_bulk_export(request.user_id, &request)
        .await?;

    let exports = state.exports.clone();
    tokio::spawn(async move { exports.process_bulk_export(task).await });

    Ok(Json(response))
}

/// GET /api/v1/export/bulk/:bulk_export_id/download
pub async fn handle_download_bulk_export(
    State(state): State<AppState>,
    Path(bulk_export_id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Response, AppError> {
    let (path, filename) = state
        .exports
        .get_bulk_download_info(&bulk_export_id, params.user_id)
        .await?;
    serve_file(&path, &filename, "application/zip").await
}

/// GET /api/v1/export/bulk/:bulk_export_id/status
pub async fn handle_bulk_export_status(
    State(state): State<AppState>,
    Path(bulk_export_id): Path<String>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ExportStatusView>, AppError> {
    let view = state
        .exports
        .get_bulk_status(&bulk_export_id, params.user_id)
        .await?;
    Ok(Json(view))
}

// ── History, limits, cleanup ────────────────────────────────────────────

/// GET /api/v1/export/history
pub async fn handle_export_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ExportHistoryResponse>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let history = state
        .exports
        .export_history(params.user_id, limit, params.include_expired.unwrap_or(false))
        .await?;
    Ok(Json(history))
}

/// GET /api/v1/export/limits
pub async fn handle_export_limits(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<crate::export::quota::LimitsInfo>, AppError> {
    let info = state.exports.quota().limits_info(params.user_id).await?;
    Ok(Json(info))
}

/// POST /api/v1/export/cleanup-expired
pub async fn handle_cleanup_expired(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<CleanupResult>, AppError> {
    let result = state.cleanup.cleanup_user_expired(params.user_id).await?;
    Ok(Json(result))
}

// ── Admin ───────────────────────────────────────────────────────────────

async fn require_admin(state: &AppState, user_id: Uuid, operation: &str) -> Result<(), AppError> {
    if state.exports.quota().is_admin(user_id).await {
        Ok(())
    } else {
        Err(ExportError::Unauthorized {
            export_id: operation.to_string(),
            user_id: user_id.to_string(),
        }
        .into())
    }
}

/// POST /api/v1/export/admin/cleanup-all-expired
pub async fn handle_admin_cleanup_expired(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<CleanupResult>, AppError> {
    require_admin(&state, params.user_id, "admin_cleanup").await?;
    let result = state.cleanup.sweep_expired_exports().await?;
    Ok(Json(result))
}

/// GET /api/v1/export/admin/stats
pub async fn handle_admin_stats(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, params.user_id, "admin_stats").await?;
    let exports = state.exports.store().export_statistics().await?;
    let cleanup = state.cleanup.stats().await?;
    Ok(Json(json!({ "exports": exports, "cleanup": cleanup })))
}

/// POST /api/v1/export/admin/purge-user/:user_id
pub async fn handle_admin_purge_user(
    State(state): State<AppState>,
    Path(target_user_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<CleanupResult>, AppError> {
    require_admin(&state, params.user_id, "admin_purge_user").await?;
    let result = state.cleanup.purge_user_data(target_user_id).await?;
    Ok(Json(result))
}

// ── Shared ──────────────────────────────────────────────────────────────

/// Streams an artifact as an attachment with no-cache headers.
async fn serve_file(path: &FsPath, filename: &str, media_type: &str) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ExportError::filesystem("open_file", path.display().to_string(), e))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let headers = [
        (header::CONTENT_TYPE, media_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
        (
            header::CACHE_CONTROL,
            "no-cache, no-store, must-revalidate".to_string(),
        ),
        (header::PRAGMA, "no-cache".to_string()),
        (header::EXPIRES, "0".to_string()),
    ];
    Ok((headers, body).into_response())
}
