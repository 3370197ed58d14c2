#![allow(dead_code)]

//! Export record models — rows for the `exports`, `bulk_exports`, and
//! `export_usage` tables, plus the request/response DTOs for the export API.
//!
//! Status lifecycle per record: `processing → completed | failed`. Terminal
//! states are final; a record is never reopened.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ExportStatus {
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStatus::Processing => write!(f, "processing"),
            ExportStatus::Completed => write!(f, "completed"),
            ExportStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Free,
    Premium,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Free => "free",
            SubscriptionPlan::Premium => "premium",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }

    /// Parses a stored plan name, falling back to `Free` for anything unknown.
    pub fn parse_or_free(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "premium" => SubscriptionPlan::Premium,
            "enterprise" => SubscriptionPlan::Enterprise,
            _ => SubscriptionPlan::Free,
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Records
// ────────────────────────────────────────────────────────────────────────────

/// One single-document export job. `file_size` stays NULL until the record
/// reaches `completed`; `expires_at` is fixed at creation and never extended.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExportRecord {
    pub id: String,
    pub user_id: Uuid,
    pub resume_id: Uuid,
    pub resume_title: String,
    pub format: ExportFormat,
    pub filename: String,
    pub file_path: String,
    pub status: ExportStatus,
    pub subscription_plan: SubscriptionPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub download_count: i32,
    pub last_downloaded_at: Option<DateTime<Utc>>,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
}

impl ExportRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A zip archive export covering several resumes. Partial success is
/// permitted: `valid_resume_count` ≤ `resume_ids.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BulkExportRecord {
    pub id: String,
    pub user_id: Uuid,
    pub resume_ids: Vec<Uuid>,
    pub valid_resume_count: i32,
    pub format: ExportFormat,
    pub zip_path: String,
    pub status: ExportStatus,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub download_count: i32,
    pub last_downloaded_at: Option<DateTime<Utc>>,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
}

impl BulkExportRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Per-(user, calendar month) export counter. Created lazily on the first
/// export of a month, purged after one year by the stale-usage sweep.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExportUsageRow {
    pub user_id: Uuid,
    pub month: NaiveDate,
    pub count: i32,
    pub first_export: DateTime<Utc>,
    pub last_export: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Request / response DTOs
// ────────────────────────────────────────────────────────────────────────────

use crate::models::resume::ResumeContent;

/// Body for `POST /api/v1/export/:resume_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub user_id: Uuid,
    pub format: ExportFormat,
    pub content: ResumeContent,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    pub export_id: String,
    pub download_url: String,
    pub filename: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Body for `POST /api/v1/export/bulk`.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkExportRequest {
    pub user_id: Uuid,
    pub resume_ids: Vec<Uuid>,
    pub format: ExportFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkExportResponse {
    pub bulk_export_id: String,
    pub message: String,
    pub resume_count: i32,
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Status projection for polling clients. Progress is coarse for single
/// exports (0 / 50 / 100) and incremental for bulk jobs.
#[derive(Debug, Clone, Serialize)]
pub struct ExportStatusView {
    pub id: String,
    pub status: ExportStatus,
    pub progress: i32,
    pub filename: Option<String>,
    pub format: ExportFormat,
    pub resume_count: Option<i32>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub download_count: i32,
    pub error_message: Option<String>,
    pub is_expired: bool,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportHistoryItem {
    pub id: String,
    pub resume_id: Uuid,
    pub resume_title: String,
    pub format: ExportFormat,
    pub filename: String,
    pub status: ExportStatus,
    pub file_size: Option<i64>,
    pub download_count: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
    pub can_download: bool,
    pub download_url: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    pub total_exports: i64,
    pub completed_exports: i64,
    pub total_downloads: i64,
    pub total_size_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportHistoryResponse {
    pub exports: Vec<ExportHistoryItem>,
    pub summary: ExportSummary,
}

/// Outcome of a cleanup pass, returned by sweeps and the cleanup endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub message: String,
    pub deleted_count: u64,
    pub deleted_size_bytes: u64,
    pub deleted_size_mb: f64,
}

impl CleanupResult {
    pub fn new(message: impl Into<String>, deleted_count: u64, deleted_size_bytes: u64) -> Self {
        CleanupResult {
            message: message.into(),
            deleted_count,
            deleted_size_bytes,
            deleted_size_mb: (deleted_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        }
    }
}
