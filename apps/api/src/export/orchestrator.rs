//! Export Orchestrator — drives an export job from request to terminal state.
//!
//! Flow: quota check → resume validation → record persisted `processing` →
//! async render with bounded retries → size validation → staged temp file
//! persisted into place → record marked `completed` (or `failed`).
//!
//! State machine per record: `processing → completed | failed`. No other
//! transitions exist; the store refuses updates to terminal records.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ExportConfig;
use crate::errors::ExportError;
use crate::export::quota::SubscriptionService;
use crate::export::store::ExportStore;
use crate::models::export::{
    BulkExportRecord, BulkExportRequest, BulkExportResponse, ExportFormat, ExportHistoryItem,
    ExportHistoryResponse, ExportRecord, ExportRequest, ExportResponse, ExportStatus,
    ExportStatusView, ExportSummary,
};
use crate::models::resume::{ResumeContent, ResumeRow};
use crate::render::ResumeRenderer;
use crate::storage::FileStore;

/// Everything `process_export` needs, captured at creation time so the
/// background task does not re-read the request.
#[derive(Debug)]
pub struct ExportTask {
    pub export_id: String,
    pub resume: ResumeRow,
    pub content: ResumeContent,
    pub format: ExportFormat,
}

#[derive(Debug)]
pub struct BulkExportTask {
    pub bulk_export_id: String,
    pub resumes: Vec<ResumeRow>,
    pub format: ExportFormat,
}

#[derive(Debug)]
pub struct DownloadInfo {
    pub path: PathBuf,
    pub filename: String,
    pub media_type: &'static str,
}

enum AttemptError {
    /// Output exceeded the plan cap. Deterministic — retrying cannot help.
    Oversize { size: u64, max: u64 },
    Other(anyhow::Error),
}

impl From<ExportError> for AttemptError {
    fn from(e: ExportError) -> Self {
        AttemptError::Other(anyhow::Error::new(e))
    }
}

pub struct ExportService {
    store: Arc<dyn ExportStore>,
    files: Arc<FileStore>,
    renderer: Arc<dyn ResumeRenderer>,
    quota: Arc<SubscriptionService>,
    config: ExportConfig,
}

impl ExportService {
    pub fn new(
        store: Arc<dyn ExportStore>,
        files: Arc<FileStore>,
        renderer: Arc<dyn ResumeRenderer>,
        quota: Arc<SubscriptionService>,
        config: ExportConfig,
    ) -> Self {
        ExportService {
            store,
            files,
            renderer,
            quota,
            config,
        }
    }

    pub fn quota(&self) -> &SubscriptionService {
        &self.quota
    }

    pub fn store(&self) -> &Arc<dyn ExportStore> {
        &self.store
    }

    // ── Single export ───────────────────────────────────────────────────

    /// Validates quota and ownership, persists the record in `processing`,
    /// and returns the response plus the task for async rendering. No record
    /// is created when the quota check rejects.
    pub async fn create_export(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
        request: &ExportRequest,
    ) -> Result<(ExportResponse, ExportTask), ExportError> {
        let subscription = self.quota.subscription(user_id).await;
        let check = self.quota.check_export_limits(user_id, &subscription).await;
        if !check.can_export && check.reason == "limit_reached" {
            return Err(ExportError::LimitExceeded {
                limit: check.limit.unwrap_or(0),
                used: check.used.unwrap_or(0),
                plan: subscription.plan.to_string(),
            });
        }

        let resume = self.store.resume_for_export(resume_id, user_id).await?;

        let export_id = format!(
            "{}_{}_{}",
            resume_id,
            Utc::now().timestamp(),
            short_token()
        );
        let file_path = self.files.export_path(user_id, resume_id, request.format);
        let filename = generate_filename(&resume.title, request.filename.as_deref(), request.format);

        let limits = self.config.limits_for(subscription.plan);
        let now = Utc::now();
        let record = ExportRecord {
            id: export_id.clone(),
            user_id,
            resume_id,
            resume_title: resume.title.clone(),
            format: request.format,
            filename: filename.clone(),
            file_path: file_path.display().to_string(),
            status: ExportStatus::Processing,
            subscription_plan: subscription.plan,
            created_at: now,
            updated_at: None,
            completed_at: None,
            expires_at: now + chrono::Duration::hours(limits.export_expiry_hours),
            download_count: 0,
            last_downloaded_at: None,
            file_size: None,
            error_message: None,
        };
        self.store.create_export(&record).await?;

        self.quota.increment_usage(user_id).await;
        if let Err(e) = self
            .store
            .update_resume_export_status(resume_id, subscription.is_subscribed)
            .await
        {
            warn!("Could not update resume export status for {resume_id}: {e}");
        }

        let response = ExportResponse {
            export_id: export_id.clone(),
            download_url: format!("/api/v1/export/{export_id}/download"),
            filename,
            message: "export_started".to_string(),
            expires_at: record.expires_at,
        };
        let task = ExportTask {
            export_id,
            resume,
            content: request.content.clone(),
            format: request.format,
        };
        Ok((response, task))
    }

    /// Renders the artifact with bounded retries and drives the record to a
    /// terminal state. Runs as a spawned background task; failures are
    /// persisted on the record, never surfaced to a caller.
    pub async fn process_export(&self, task: ExportTask) {
        let export_id = task.export_id.clone();
        let record = match self.store.get_export(&export_id, None).await {
            Ok(record) => record,
            Err(e) => {
                error!("Export {export_id} vanished before processing: {e}");
                return;
            }
        };
        let limits = self.config.limits_for(record.subscription_plan);
        let max_bytes = limits.max_file_size_bytes();
        let final_path = PathBuf::from(&record.file_path);

        let max_attempts = self.config.max_export_retries.max(1);
        for attempt in 1..=max_attempts {
            match self.render_attempt(&task, max_bytes, &final_path).await {
                Ok(size) => {
                    if let Err(e) = self
                        .store
                        .update_export_status(&export_id, ExportStatus::Completed, Some(size), None)
                        .await
                    {
                        error!("Could not mark export {export_id} completed: {e}");
                    }
                    info!("Export {export_id} completed successfully ({size} bytes)");
                    return;
                }
                Err(AttemptError::Oversize { size, max }) => {
                    // Output size is deterministic — retrying won't help.
                    let err = ExportError::FileSizeExceeded { size, max };
                    error!("Export {export_id} failed due to size limit: {err}");
                    if let Err(e) = self
                        .store
                        .update_export_status(
                            &export_id,
                            ExportStatus::Failed,
                            None,
                            Some(err.to_string()),
                        )
                        .await
                    {
                        error!("Could not mark export {export_id} failed: {e}");
                    }
                    let _ = self.files.delete_file(&final_path).await;
                    return;
                }
                Err(AttemptError::Other(e)) => {
                    error!("Export {export_id} attempt {attempt}/{max_attempts} failed: {e:#}");
                    if attempt == max_attempts {
                        if let Err(update_err) = self
                            .store
                            .update_export_status(
                                &export_id,
                                ExportStatus::Failed,
                                None,
                                Some(e.to_string()),
                            )
                            .await
                        {
                            error!("Could not mark export {export_id} failed: {update_err}");
                        }
                        return;
                    }
                    tokio::time::sleep(Duration::from_secs(
                        self.config.retry_delay_seconds * attempt as u64,
                    ))
                    .await;
                }
            }
        }
    }

    /// One render attempt: stage into a scoped temp file, validate size,
    /// persist into the final path. The temp file is deleted on every
    /// failure path by the guard.
    async fn render_attempt(
        &self,
        task: &ExportTask,
        max_bytes: u64,
        final_path: &Path,
    ) -> Result<i64, AttemptError> {
        let temp = self
            .files
            .temp_artifact(&format!(".{}", task.format.extension()))?;

        self.renderer
            .render(&task.resume, &task.content, task.format, temp.path())
            .await
            .map_err(AttemptError::Other)?;

        let size = self.files.file_size(temp.path()).await;
        if size == 0 {
            return Err(AttemptError::Other(anyhow::anyhow!(
                "renderer produced no output"
            )));
        }
        if size > max_bytes {
            return Err(AttemptError::Oversize {
                size,
                max: max_bytes,
            });
        }

        temp.persist(final_path)?;
        Ok(size as i64)
    }

    /// Ownership- and lifecycle-gated download resolution. Increments the
    /// download counter on success.
    pub async fn get_download_info(
        &self,
        export_id: &str,
        user_id: Uuid,
    ) -> Result<DownloadInfo, ExportError> {
        let record = self.store.get_export(export_id, Some(user_id)).await?;

        if record.is_expired(Utc::now()) {
            return Err(ExportError::Expired {
                export_id: export_id.to_string(),
            });
        }
        match record.status {
            ExportStatus::Processing => {
                return Err(ExportError::Processing {
                    export_id: export_id.to_string(),
                })
            }
            ExportStatus::Failed => {
                return Err(ExportError::Failed {
                    export_id: export_id.to_string(),
                    message: record.error_message.clone(),
                })
            }
            ExportStatus::Completed => {}
        }

        let path = PathBuf::from(&record.file_path);
        if !self.files.file_exists(&path).await {
            return Err(ExportError::NotFound {
                export_id: export_id.to_string(),
            });
        }

        self.store.increment_download_count(export_id).await?;

        Ok(DownloadInfo {
            path,
            filename: record.filename,
            media_type: record.format.media_type(),
        })
    }

    pub async fn get_status(
        &self,
        export_id: &str,
        user_id: Uuid,
    ) -> Result<ExportStatusView, ExportError> {
        let record = self.store.get_export(export_id, Some(user_id)).await?;
        Ok(single_status_view(&record, Utc::now()))
    }

    /// Deletes the physical file (best-effort) and the record
    /// (unconditionally).
    pub async fn delete_export(&self, export_id: &str, user_id: Uuid) -> Result<(), ExportError> {
        let record = self.store.get_export(export_id, Some(user_id)).await?;

        let path = PathBuf::from(&record.file_path);
        if let Err(e) = self.files.delete_file(&path).await {
            warn!("Could not delete artifact for export {export_id}: {e}");
        }
        self.store.delete_export(export_id).await
    }

    pub async fn export_history(
        &self,
        user_id: Uuid,
        limit: i64,
        include_expired: bool,
    ) -> Result<ExportHistoryResponse, ExportError> {
        let records = self.store.recent_exports(user_id, limit).await?;
        let now = Utc::now();

        let mut items = Vec::new();
        let mut summary = ExportSummary::default();

        for record in records {
            summary.total_exports += 1;

            let is_expired = record.is_expired(now);
            if is_expired && !include_expired {
                continue;
            }

            let resume_title = self.store.resume_title(record.resume_id).await;
            let can_download = record.status == ExportStatus::Completed && !is_expired;

            if record.status == ExportStatus::Completed {
                summary.completed_exports += 1;
            }
            summary.total_downloads += record.download_count as i64;
            summary.total_size_bytes += record.file_size.unwrap_or(0);

            items.push(ExportHistoryItem {
                id: record.id.clone(),
                resume_id: record.resume_id,
                resume_title,
                format: record.format,
                filename: record.filename,
                status: record.status,
                file_size: record.file_size,
                download_count: record.download_count,
                created_at: record.created_at,
                expires_at: record.expires_at,
                is_expired,
                can_download,
                download_url: can_download
                    .then(|| format!("/api/v1/export/{}/download", record.id)),
                error_message: record.error_message,
            });
        }

        Ok(ExportHistoryResponse {
            exports: items,
            summary,
        })
    }

    // ── Bulk export ─────────────────────────────────────────────────────

    /// Creates a bulk export job. Gated on an active subscription and the
    /// plan's per-job resume cap — both checked before any resume is
    /// validated. Invalid/foreign/deleted resumes are skipped, not fatal.
    pub async fn create_bulk_export(
        &self,
        user_id: Uuid,
        request: &BulkExportRequest,
    ) -> Result<(BulkExportResponse, BulkExportTask), ExportError> {
        let subscription = self.quota.subscription(user_id).await;
        if !subscription.is_subscribed {
            return Err(ExportError::PremiumRequired {
                feature: "Bulk export".to_string(),
            });
        }

        let requested = request.resume_ids.len();
        if !self.quota.validate_bulk_permission(user_id, requested).await {
            let limits = self.config.limits_for(subscription.plan);
            return Err(ExportError::BulkLimitExceeded {
                requested,
                max_allowed: limits.max_bulk_resumes,
            });
        }

        let mut valid_resumes = Vec::new();
        for &resume_id in &request.resume_ids {
            match self.store.resume_for_export(resume_id, user_id).await {
                Ok(resume) => valid_resumes.push(resume),
                Err(
                    ExportError::ResumeNotFound { .. }
                    | ExportError::Unauthorized { .. }
                    | ExportError::ResumeDeleted { .. },
                ) => {
                    warn!("Skipping invalid resume {resume_id} for user {user_id}");
                }
                Err(e) => return Err(e),
            }
        }
        if valid_resumes.is_empty() {
            return Err(ExportError::NotFound {
                export_id: "No valid resumes found".to_string(),
            });
        }

        let bulk_export_id = format!("bulk_{}_{}_{}", user_id, Utc::now().timestamp(), short_token());
        let zip_path = self.files.bulk_export_path(user_id);
        let now = Utc::now();
        let record = BulkExportRecord {
            id: bulk_export_id.clone(),
            user_id,
            resume_ids: request.resume_ids.clone(),
            valid_resume_count: valid_resumes.len() as i32,
            format: request.format,
            zip_path: zip_path.display().to_string(),
            status: ExportStatus::Processing,
            progress: 0,
            created_at: now,
            updated_at: None,
            completed_at: None,
            expires_at: now + chrono::Duration::hours(self.config.bulk_export_expiry_hours),
            download_count: 0,
            last_downloaded_at: None,
            file_size: None,
            error_message: None,
        };
        self.store.create_bulk_export(&record).await?;

        let response = BulkExportResponse {
            bulk_export_id: bulk_export_id.clone(),
            message: "Bulk export started".to_string(),
            resume_count: record.valid_resume_count,
            download_url: format!("/api/v1/export/bulk/{bulk_export_id}/download"),
            expires_at: record.expires_at,
        };
        let task = BulkExportTask {
            bulk_export_id,
            resumes: valid_resumes,
            format: request.format,
        };
        Ok((response, task))
    }

    /// Renders each valid resume into a shared zip archive, tolerating
    /// per-resume failures, then validates the assembled archive size.
    pub async fn process_bulk_export(&self, task: BulkExportTask) {
        let bulk_export_id = task.bulk_export_id.clone();
        let record = match self.store.get_bulk_export(&bulk_export_id, None).await {
            Ok(record) => record,
            Err(e) => {
                error!("Bulk export {bulk_export_id} vanished before processing: {e}");
                return;
            }
        };
        let zip_path = PathBuf::from(&record.zip_path);

        if let Err(e) = self.run_bulk_export(&task, &zip_path).await {
            error!("Bulk export {bulk_export_id} failed: {e}");
            if let Err(update_err) = self
                .store
                .update_bulk_export_progress(
                    &bulk_export_id,
                    ExportStatus::Failed,
                    0,
                    None,
                    Some(e.to_string()),
                )
                .await
            {
                error!("Could not mark bulk export {bulk_export_id} failed: {update_err}");
            }
            let _ = self.files.delete_file(&zip_path).await;
        }
    }

    async fn run_bulk_export(
        &self,
        task: &BulkExportTask,
        zip_path: &Path,
    ) -> Result<(), ExportError> {
        let bulk_export_id = &task.bulk_export_id;
        self.store
            .update_bulk_export_progress(bulk_export_id, ExportStatus::Processing, 0, None, None)
            .await?;

        if let Some(parent) = zip_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExportError::filesystem("create_directory", parent.display().to_string(), e))?;
        }
        let zip_file = std::fs::File::create(zip_path)
            .map_err(|e| ExportError::filesystem("create_zip", zip_path.display().to_string(), e))?;
        let mut zip = ZipWriter::new(zip_file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let total = task.resumes.len();
        let mut used_names: HashSet<String> = HashSet::new();

        for (i, resume) in task.resumes.iter().enumerate() {
            let temp = self
                .files
                .temp_artifact(&format!(".{}", task.format.extension()))?;
            let rendered = self
                .renderer
                .render(resume, &resume.content.0, task.format, temp.path())
                .await;

            match rendered {
                Ok(()) => {
                    let entry_name = unique_entry_name(&mut used_names, &resume.title, task.format);
                    let bytes = std::fs::read(temp.path()).map_err(|e| {
                        ExportError::filesystem("read_temp_file", temp.path().display().to_string(), e)
                    })?;
                    zip.start_file(entry_name, options)
                        .map_err(|e| ExportError::filesystem("create_zip", zip_path.display().to_string(), e))?;
                    zip.write_all(&bytes)
                        .map_err(|e| ExportError::filesystem("create_zip", zip_path.display().to_string(), e))?;
                }
                Err(e) => {
                    error!("Error exporting resume {} in bulk export: {e:#}", resume.id);
                    continue;
                }
            }

            // Generation accounts for the first 90%; completion sets 100.
            let progress = (((i + 1) as f64 / total as f64) * 90.0) as i32;
            self.store
                .update_bulk_export_progress(
                    bulk_export_id,
                    ExportStatus::Processing,
                    progress,
                    None,
                    None,
                )
                .await?;
        }

        zip.finish()
            .map_err(|e| ExportError::filesystem("create_zip", zip_path.display().to_string(), e))?;

        if !self.files.file_exists(zip_path).await {
            return Err(ExportError::filesystem(
                "create_zip",
                zip_path.display().to_string(),
                "ZIP file was not created",
            ));
        }
        let zip_size = self.files.file_size(zip_path).await;
        if zip_size == 0 {
            return Err(ExportError::filesystem(
                "create_zip",
                zip_path.display().to_string(),
                "ZIP file is empty",
            ));
        }

        let max_bytes = self.config.max_bulk_export_size_mb * 1024 * 1024;
        if zip_size > max_bytes {
            let _ = self.files.delete_file(zip_path).await;
            return Err(ExportError::FileSizeExceeded {
                size: zip_size,
                max: max_bytes,
            });
        }

        self.store
            .update_bulk_export_progress(
                bulk_export_id,
                ExportStatus::Completed,
                100,
                Some(zip_size as i64),
                None,
            )
            .await?;
        info!("Bulk export {bulk_export_id} completed successfully ({zip_size} bytes)");
        Ok(())
    }

    pub async fn get_bulk_download_info(
        &self,
        bulk_export_id: &str,
        user_id: Uuid,
    ) -> Result<(PathBuf, String), ExportError> {
        let record = self
            .store
            .get_bulk_export(bulk_export_id, Some(user_id))
            .await?;

        if record.is_expired(Utc::now()) {
            return Err(ExportError::Expired {
                export_id: bulk_export_id.to_string(),
            });
        }
        match record.status {
            ExportStatus::Processing => {
                return Err(ExportError::Processing {
                    export_id: bulk_export_id.to_string(),
                })
            }
            ExportStatus::Failed => {
                return Err(ExportError::Failed {
                    export_id: bulk_export_id.to_string(),
                    message: record.error_message.clone(),
                })
            }
            ExportStatus::Completed => {}
        }

        let path = PathBuf::from(&record.zip_path);
        if !self.files.file_exists(&path).await {
            return Err(ExportError::NotFound {
                export_id: bulk_export_id.to_string(),
            });
        }

        self.store
            .increment_bulk_download_count(bulk_export_id)
            .await?;

        let filename = format!(
            "resumes_bulk_export_{}.zip",
            record.created_at.format("%Y%m%d")
        );
        Ok((path, filename))
    }

    pub async fn get_bulk_status(
        &self,
        bulk_export_id: &str,
        user_id: Uuid,
    ) -> Result<ExportStatusView, ExportError> {
        let record = self
            .store
            .get_bulk_export(bulk_export_id, Some(user_id))
            .await?;
        Ok(bulk_status_view(&record, Utc::now()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pure helpers
// ────────────────────────────────────────────────────────────────────────────

fn short_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Coarse progress for single exports: terminal completion is 100, a failed
/// job reports 0, anything in flight is 50.
pub fn single_export_progress(status: ExportStatus) -> i32 {
    match status {
        ExportStatus::Processing => 50,
        ExportStatus::Completed => 100,
        ExportStatus::Failed => 0,
    }
}

pub fn single_status_view(record: &ExportRecord, now: DateTime<Utc>) -> ExportStatusView {
    let is_expired = record.is_expired(now);
    let downloadable = record.status == ExportStatus::Completed && !is_expired;
    ExportStatusView {
        id: record.id.clone(),
        status: record.status,
        progress: single_export_progress(record.status),
        filename: Some(record.filename.clone()),
        format: record.format,
        resume_count: None,
        file_size: record.file_size,
        created_at: record.created_at,
        expires_at: record.expires_at,
        download_count: record.download_count,
        error_message: record.error_message.clone(),
        is_expired,
        download_url: downloadable.then(|| format!("/api/v1/export/{}/download", record.id)),
    }
}

pub fn bulk_status_view(record: &BulkExportRecord, now: DateTime<Utc>) -> ExportStatusView {
    let is_expired = record.is_expired(now);
    let downloadable = record.status == ExportStatus::Completed && !is_expired;
    ExportStatusView {
        id: record.id.clone(),
        status: record.status,
        progress: record.progress,
        filename: None,
        format: record.format,
        resume_count: Some(record.valid_resume_count),
        file_size: record.file_size,
        created_at: record.created_at,
        expires_at: record.expires_at,
        download_count: record.download_count,
        error_message: record.error_message.clone(),
        is_expired,
        download_url: downloadable
            .then(|| format!("/api/v1/export/bulk/{}/download", record.id)),
    }
}

/// Destination filename: a caller-supplied name is sanitized and capped at
/// 100 chars; otherwise one is derived from the resume title (sanitized,
/// capped at 50) plus the format extension.
pub fn generate_filename(title: &str, requested: Option<&str>, format: ExportFormat) -> String {
    if let Some(requested) = requested {
        let mut safe: String = requested
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
            .collect();
        safe.truncate(100);
        if !safe.is_empty() {
            return safe;
        }
    }
    format!("{}.{}", sanitize_title(title), format.extension())
}

/// Title → filename stem: keep word characters, spaces become underscores,
/// capped at 50, "resume" when nothing survives.
pub fn sanitize_title(title: &str) -> String {
    let mut safe: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect::<String>()
        .replace(' ', "_");
    safe.truncate(50);
    if safe.is_empty() {
        "resume".to_string()
    } else {
        safe
    }
}

/// Zip entry name, deduplicated with a numeric suffix when several resumes
/// share a title.
fn unique_entry_name(
    used: &mut HashSet<String>,
    title: &str,
    format: ExportFormat,
) -> String {
    let stem = sanitize_title(title);
    let mut candidate = format!("{stem}.{}", format.extension());
    let mut counter = 1;
    while used.contains(&candidate) {
        candidate = format!("{stem}_{counter}.{}", format.extension());
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
