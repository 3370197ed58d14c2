//! Export Record Store — CRUD and query layer over the `exports`,
//! `bulk_exports`, and `export_usage` tables plus the resume/user lookups
//! the orchestrator needs.
//!
//! The store is a trait so the orchestrator and cleanup sweeps can run
//! against an in-memory implementation in tests; `PgExportStore` is the
//! production backend. Status updates only apply to records still in
//! `processing` — terminal states are final at the store level, not just by
//! caller discipline.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::ExportError;
use crate::models::export::{BulkExportRecord, ExportRecord, ExportStatus};
use crate::models::resume::ResumeRow;
use crate::models::user::UserRow;

/// Platform-wide aggregates for the admin surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportStatistics {
    pub total_exports: i64,
    pub recent_exports_30d: i64,
    pub by_status: StatusBreakdown,
    pub by_format: FormatBreakdown,
    pub by_plan: PlanBreakdown,
    pub total_file_size: i64,
    pub average_file_size: f64,
    pub expired_exports: i64,
    pub total_bulk_exports: i64,
    pub recent_bulk_exports_30d: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBreakdown {
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FormatBreakdown {
    pub pdf: i64,
    pub docx: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanBreakdown {
    pub free: i64,
    pub premium: i64,
    pub enterprise: i64,
}

#[async_trait]
pub trait ExportStore: Send + Sync {
    // ── Single exports ──────────────────────────────────────────────────

    async fn create_export(&self, record: &ExportRecord) -> Result<(), ExportError>;

    /// Fetches a record; when `user_id` is given, mismatched ownership is
    /// `Unauthorized`, never a silent miss.
    async fn get_export(
        &self,
        export_id: &str,
        user_id: Option<Uuid>,
    ) -> Result<ExportRecord, ExportError>;

    /// Applies a status transition. Records already in a terminal state are
    /// left untouched.
    async fn update_export_status(
        &self,
        export_id: &str,
        status: ExportStatus,
        file_size: Option<i64>,
        error_message: Option<String>,
    ) -> Result<(), ExportError>;

    async fn increment_download_count(&self, export_id: &str) -> Result<(), ExportError>;

    async fn delete_export(&self, export_id: &str) -> Result<(), ExportError>;

    /// Most recent exports for a user, newest first.
    async fn recent_exports(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExportRecord>, ExportError>;

    /// Completed exports created since `since` — the quota lookback.
    async fn count_completed_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, ExportError>;

    async fn expired_exports(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ExportRecord>, ExportError>;

    async fn failed_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExportRecord>, ExportError>;

    async fn exports_for_user(&self, user_id: Uuid) -> Result<Vec<ExportRecord>, ExportError>;

    // ── Bulk exports ────────────────────────────────────────────────────

    async fn create_bulk_export(&self, record: &BulkExportRecord) -> Result<(), ExportError>;

    async fn get_bulk_export(
        &self,
        bulk_export_id: &str,
        user_id: Option<Uuid>,
    ) -> Result<BulkExportRecord, ExportError>;

    async fn update_bulk_export_progress(
        &self,
        bulk_export_id: &str,
        status: ExportStatus,
        progress: i32,
        file_size: Option<i64>,
        error_message: Option<String>,
    ) -> Result<(), ExportError>;

    async fn increment_bulk_download_count(&self, bulk_export_id: &str)
        -> Result<(), ExportError>;

    async fn delete_bulk_export(&self, bulk_export_id: &str) -> Result<(), ExportError>;

    async fn expired_bulk_exports(&self, limit: i64) -> Result<Vec<BulkExportRecord>, ExportError>;

    async fn bulk_exports_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BulkExportRecord>, ExportError>;

    /// Every artifact path the database knows about (single + bulk). The
    /// orphan sweep diffs the disk against this set.
    async fn all_artifact_paths(&self) -> Result<HashSet<String>, ExportError>;

    // ── Usage counters ──────────────────────────────────────────────────

    /// Atomic upsert: creates the (user, month) row on first export,
    /// increments it afterwards.
    async fn increment_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), ExportError>;

    async fn monthly_usage(&self, user_id: Uuid, month: NaiveDate) -> Result<i64, ExportError>;

    /// Deletes up to `limit` usage rows with a month before `cutoff`;
    /// returns the number removed.
    async fn delete_usage_before(&self, cutoff: NaiveDate, limit: i64)
        -> Result<u64, ExportError>;

    async fn delete_usage_for_user(&self, user_id: Uuid) -> Result<u64, ExportError>;

    // ── Resumes ─────────────────────────────────────────────────────────

    /// Ownership-validated fetch: `ResumeNotFound`, `Unauthorized`, or
    /// `ResumeDeleted` on the respective failures.
    async fn resume_for_export(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<ResumeRow, ExportError>;

    /// Title with fallbacks for deleted or missing resumes — history rows
    /// outlive their source resume.
    async fn resume_title(&self, resume_id: Uuid) -> String;

    async fn update_resume_export_status(
        &self,
        resume_id: Uuid,
        is_subscribed: bool,
    ) -> Result<(), ExportError>;

    // ── Users ───────────────────────────────────────────────────────────

    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, ExportError>;

    // ── Admin ───────────────────────────────────────────────────────────

    async fn export_statistics(&self) -> Result<ExportStatistics, ExportError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres implementation
// ────────────────────────────────────────────────────────────────────────────

pub struct PgExportStore {
    pool: PgPool,
}

impl PgExportStore {
    pub fn new(pool: PgPool) -> Self {
        PgExportStore { pool }
    }
}

#[async_trait]
impl ExportStore for PgExportStore {
    async fn create_export(&self, record: &ExportRecord) -> Result<(), ExportError> {
        sqlx::query(
            r#"
            INSERT INTO exports
                (id, user_id, resume_id, resume_title, format, filename, file_path,
                 status, subscription_plan, created_at, updated_at, completed_at,
                 expires_at, download_count, last_downloaded_at, file_size, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id)
        .bind(record.resume_id)
        .bind(&record.resume_title)
        .bind(record.format)
        .bind(&record.filename)
        .bind(&record.file_path)
        .bind(record.status)
        .bind(record.subscription_plan)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.completed_at)
        .bind(record.expires_at)
        .bind(record.download_count)
        .bind(record.last_downloaded_at)
        .bind(record.file_size)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;
        info!("Created export record {}", record.id);
        Ok(())
    }

    async fn get_export(
        &self,
        export_id: &str,
        user_id: Option<Uuid>,
    ) -> Result<ExportRecord, ExportError> {
        let record: Option<ExportRecord> =
            sqlx::query_as("SELECT * FROM exports WHERE id = $1")
                .bind(export_id)
                .fetch_optional(&self.pool)
                .await?;

        let record = record.ok_or_else(|| ExportError::NotFound {
            export_id: export_id.to_string(),
        })?;

        if let Some(user_id) = user_id {
            if record.user_id != user_id {
                return Err(ExportError::Unauthorized {
                    export_id: export_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
        }
        Ok(record)
    }

    async fn update_export_status(
        &self,
        export_id: &str,
        status: ExportStatus,
        file_size: Option<i64>,
        error_message: Option<String>,
    ) -> Result<(), ExportError> {
        // The `status = 'processing'` guard makes terminal states final.
        sqlx::query(
            r#"
            UPDATE exports
            SET status = $2,
                updated_at = now(),
                file_size = COALESCE($3, file_size),
                error_message = COALESCE($4, error_message),
                completed_at = CASE WHEN $2 = 'completed' THEN now() ELSE completed_at END
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(export_id)
        .bind(status)
        .bind(file_size)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        info!("Updated export {export_id} status to {status}");
        Ok(())
    }

    async fn increment_download_count(&self, export_id: &str) -> Result<(), ExportError> {
        sqlx::query(
            r#"
            UPDATE exports
            SET download_count = download_count + 1, last_downloaded_at = now()
            WHERE id = $1
            "#,
        )
        .bind(export_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_export(&self, export_id: &str) -> Result<(), ExportError> {
        sqlx::query("DELETE FROM exports WHERE id = $1")
            .bind(export_id)
            .execute(&self.pool)
            .await?;
        info!("Deleted export record {export_id}");
        Ok(())
    }

    async fn recent_exports(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExportRecord>, ExportError> {
        Ok(sqlx::query_as(
            "SELECT * FROM exports WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_completed_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, ExportError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM exports
            WHERE user_id = $1 AND status = 'completed' AND created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn expired_exports(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ExportRecord>, ExportError> {
        let records = match user_id {
            Some(user_id) => {
                sqlx::query_as(
                    "SELECT * FROM exports WHERE expires_at < now() AND user_id = $1 LIMIT $2",
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM exports WHERE expires_at < now() LIMIT $1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(records)
    }

    async fn failed_exports_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExportRecord>, ExportError> {
        Ok(sqlx::query_as(
            "SELECT * FROM exports WHERE status = 'failed' AND created_at < $1 LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn exports_for_user(&self, user_id: Uuid) -> Result<Vec<ExportRecord>, ExportError> {
        Ok(sqlx::query_as("SELECT * FROM exports WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_bulk_export(&self, record: &BulkExportRecord) -> Result<(), ExportError> {
        sqlx::query(
            r#"
            INSERT INTO bulk_exports
                (id, user_id, resume_ids, valid_resume_count, format, zip_path, status,
                 progress, created_at, updated_at, completed_at, expires_at,
                 download_count, last_downloaded_at, file_size, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id)
        .bind(&record.resume_ids)
        .bind(record.valid_resume_count)
        .bind(record.format)
        .bind(&record.zip_path)
        .bind(record.status)
        .bind(record.progress)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.completed_at)
        .bind(record.expires_at)
        .bind(record.download_count)
        .bind(record.last_downloaded_at)
        .bind(record.file_size)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;
        info!("Created bulk export record {}", record.id);
        Ok(())
    }

    async fn get_bulk_export(
        &self,
        bulk_export_id: &str,
        user_id: Option<Uuid>,
    ) -> Result<BulkExportRecord, ExportError> {
        let record: Option<BulkExportRecord> =
            sqlx::query_as("SELECT * FROM bulk_exports WHERE id = $1")
                .bind(bulk_export_id)
                .fetch_optional(&self.pool)
                .await?;

        let record = record.ok_or_else(|| ExportError::NotFound {
            export_id: bulk_export_id.to_string(),
        })?;

        if let Some(user_id) = user_id {
            if record.user_id != user_id {
                return Err(ExportError::Unauthorized {
                    export_id: bulk_export_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
        }
        Ok(record)
    }

    async fn update_bulk_export_progress(
        &self,
        bulk_export_id: &str,
        status: ExportStatus,
        progress: i32,
        file_size: Option<i64>,
        error_message: Option<String>,
    ) -> Result<(), ExportError> {
        sqlx::query(
            r#"
            UPDATE bulk_exports
            SET status = $2,
                progress = $3,
                updated_at = now(),
                file_size = COALESCE($4, file_size),
                error_message = COALESCE($5, error_message),
                completed_at = CASE WHEN $2 = 'completed' THEN now() ELSE completed_at END
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(bulk_export_id)
        .bind(status)
        .bind(progress)
        .bind(file_size)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        info!("Updated bulk export {bulk_export_id}: status={status}, progress={progress}%");
        Ok(())
    }

    async fn increment_bulk_download_count(
        &self,
        bulk_export_id: &str,
    ) -> Result<(), ExportError> {
        sqlx::query(
            r#"
            UPDATE bulk_exports
            SET download_count = download_count + 1, last_downloaded_at = now()
            WHERE id = $1
            "#,
        )
        .bind(bulk_export_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_bulk_export(&self, bulk_export_id: &str) -> Result<(), ExportError> {
        sqlx::query("DELETE FROM bulk_exports WHERE id = $1")
            .bind(bulk_export_id)
            .execute(&self.pool)
            .await?;
        info!("Deleted bulk export record {bulk_export_id}");
        Ok(())
    }

    async fn expired_bulk_exports(
        &self,
        limit: i64,
    ) -> Result<Vec<BulkExportRecord>, ExportError> {
        Ok(
            sqlx::query_as("SELECT * FROM bulk_exports WHERE expires_at < now() LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn bulk_exports_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BulkExportRecord>, ExportError> {
        Ok(sqlx::query_as("SELECT * FROM bulk_exports WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn all_artifact_paths(&self) -> Result<HashSet<String>, ExportError> {
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT file_path FROM exports UNION ALL SELECT zip_path FROM bulk_exports",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(paths.into_iter().collect())
    }

    async fn increment_usage(
        &self,
        user_id: Uuid,
        month: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), ExportError> {
        sqlx::query(
            r#"
            INSERT INTO export_usage (user_id, month, count, first_export, last_export)
            VALUES ($1, $2, 1, $3, $3)
            ON CONFLICT (user_id, month)
            DO UPDATE SET count = export_usage.count + 1, last_export = $3
            "#,
        )
        .bind(user_id)
        .bind(month)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn monthly_usage(&self, user_id: Uuid, month: NaiveDate) -> Result<i64, ExportError> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT count FROM export_usage WHERE user_id = $1 AND month = $2",
        )
        .bind(user_id)
        .bind(month)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0) as i64)
    }

    async fn delete_usage_before(
        &self,
        cutoff: NaiveDate,
        limit: i64,
    ) -> Result<u64, ExportError> {
        let result = sqlx::query(
            r#"
            DELETE FROM export_usage
            WHERE (user_id, month) IN (
                SELECT user_id, month FROM export_usage WHERE month < $1 LIMIT $2
            )
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_usage_for_user(&self, user_id: Uuid) -> Result<u64, ExportError> {
        let result = sqlx::query("DELETE FROM export_usage WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn resume_for_export(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<ResumeRow, ExportError> {
        let resume: Option<ResumeRow> = sqlx::query_as("SELECT * FROM resumes WHERE id = $1")
            .bind(resume_id)
            .fetch_optional(&self.pool)
            .await?;

        let resume = resume.ok_or_else(|| ExportError::ResumeNotFound {
            resume_id: resume_id.to_string(),
        })?;

        if resume.user_id != user_id {
            return Err(ExportError::Unauthorized {
                export_id: resume_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        if resume.is_deleted() {
            return Err(ExportError::ResumeDeleted {
                resume_id: resume_id.to_string(),
            });
        }
        Ok(resume)
    }

    async fn resume_title(&self, resume_id: Uuid) -> String {
        let row: Result<Option<(String, Option<DateTime<Utc>>)>, sqlx::Error> =
            sqlx::query_as("SELECT title, deleted_at FROM resumes WHERE id = $1")
                .bind(resume_id)
                .fetch_optional(&self.pool)
                .await;

        match row {
            Ok(Some((title, None))) => title,
            Ok(Some((title, Some(_)))) => format!("{title} (Deleted)"),
            Ok(None) => "Deleted Resume".to_string(),
            Err(e) => {
                tracing::warn!("Could not get resume title for {resume_id}: {e}");
                "Unknown Resume".to_string()
            }
        }
    }

    async fn update_resume_export_status(
        &self,
        resume_id: Uuid,
        is_subscribed: bool,
    ) -> Result<(), ExportError> {
        let export_status = if is_subscribed { "subscribed" } else { "paid" };
        sqlx::query(
            "UPDATE resumes SET export_status = $2, last_exported_at = now() WHERE id = $1",
        )
        .bind(resume_id)
        .bind(export_status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, ExportError> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn export_statistics(&self) -> Result<ExportStatistics, ExportError> {
        let thirty_days_ago = Utc::now() - Duration::days(30);

        #[allow(clippy::type_complexity)]
        let (
            total,
            recent,
            processing,
            completed,
            failed,
            pdf,
            docx,
            free,
            premium,
            enterprise,
            total_size,
            sized_count,
            expired,
        ): (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE created_at >= $1),
                COUNT(*) FILTER (WHERE status = 'processing'),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (WHERE format = 'pdf'),
                COUNT(*) FILTER (WHERE format = 'docx'),
                COUNT(*) FILTER (WHERE subscription_plan = 'free'),
                COUNT(*) FILTER (WHERE subscription_plan = 'premium'),
                COUNT(*) FILTER (WHERE subscription_plan = 'enterprise'),
                COALESCE(SUM(file_size), 0)::BIGINT,
                COUNT(*) FILTER (WHERE file_size > 0),
                COUNT(*) FILTER (WHERE expires_at < now())
            FROM exports
            "#,
        )
        .bind(thirty_days_ago)
        .fetch_one(&self.pool)
        .await?;

        let (bulk_total, bulk_recent): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE created_at >= $1) FROM bulk_exports",
        )
        .bind(thirty_days_ago)
        .fetch_one(&self.pool)
        .await?;

        let average_file_size = if sized_count > 0 {
            (total_size as f64 / sized_count as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(ExportStatistics {
            total_exports: total,
            recent_exports_30d: recent,
            by_status: StatusBreakdown {
                processing,
                completed,
                failed,
            },
            by_format: FormatBreakdown { pdf, docx },
            by_plan: PlanBreakdown {
                free,
                premium,
                enterprise,
            },
            total_file_size: total_size,
            average_file_size,
            expired_exports: expired,
            total_bulk_exports: bulk_total,
            recent_bulk_exports_30d: bulk_recent,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store for tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::export::ExportUsageRow;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// HashMap-backed `ExportStore` used by orchestrator and cleanup tests.
    #[derive(Default)]
    pub struct MemoryExportStore {
        pub exports: Mutex<HashMap<String, ExportRecord>>,
        pub bulk_exports: Mutex<HashMap<String, BulkExportRecord>>,
        pub usage: Mutex<HashMap<(Uuid, NaiveDate), ExportUsageRow>>,
        pub resumes: Mutex<HashMap<Uuid, ResumeRow>>,
        pub users: Mutex<HashMap<Uuid, UserRow>>,
    }

    impl MemoryExportStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_resume(&self, resume: ResumeRow) {
            self.resumes.lock().unwrap().insert(resume.id, resume);
        }

        pub fn add_user(&self, user: UserRow) {
            self.users.lock().unwrap().insert(user.id, user);
        }

        pub fn export_count(&self) -> usize {
            self.exports.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExportStore for MemoryExportStore {
        async fn create_export(&self, record: &ExportRecord) -> Result<(), ExportError> {
            self.exports
                .lock()
                .unwrap()
                .insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn get_export(
            &self,
            export_id: &str,
            user_id: Option<Uuid>,
        ) -> Result<ExportRecord, ExportError> {
            let record = self
                .exports
                .lock()
                .unwrap()
                .get(export_id)
                .cloned()
                .ok_or_else(|| ExportError::NotFound {
                    export_id: export_id.to_string(),
                })?;
            if let Some(user_id) = user_id {
                if record.user_id != user_id {
                    return Err(ExportError::Unauthorized {
                        export_id: export_id.to_string(),
                        user_id: user_id.to_string(),
                    });
                }
            }
            Ok(record)
        }

        async fn update_export_status(
            &self,
            export_id: &str,
            status: ExportStatus,
            file_size: Option<i64>,
            error_message: Option<String>,
        ) -> Result<(), ExportError> {
            let mut exports = self.exports.lock().unwrap();
            if let Some(record) = exports.get_mut(export_id) {
                if record.status.is_terminal() {
                    return Ok(());
                }
                record.status = status;
                record.updated_at = Some(Utc::now());
                if file_size.is_some() {
                    record.file_size = file_size;
                }
                if error_message.is_some() {
                    record.error_message = error_message;
                }
                if status == ExportStatus::Completed {
                    record.completed_at = Some(Utc::now());
                }
            }
            Ok(())
        }

        async fn increment_download_count(&self, export_id: &str) -> Result<(), ExportError> {
            if let Some(record) = self.exports.lock().unwrap().get_mut(export_id) {
                record.download_count += 1;
                record.last_downloaded_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn delete_export(&self, export_id: &str) -> Result<(), ExportError> {
            self.exports.lock().unwrap().remove(export_id);
            Ok(())
        }

        async fn recent_exports(
            &self,
            user_id: Uuid,
            limit: i64,
        ) -> Result<Vec<ExportRecord>, ExportError> {
            let mut records: Vec<ExportRecord> = self
                .exports
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            records.truncate(limit as usize);
            Ok(records)
        }

        async fn count_completed_since(
            &self,
            user_id: Uuid,
            since: DateTime<Utc>,
        ) -> Result<i64, ExportError> {
            Ok(self
                .exports
                .lock()
                .unwrap()
                .values()
                .filter(|r| {
                    r.user_id == user_id
                        && r.status == ExportStatus::Completed
                        && r.created_at >= since
                })
                .count() as i64)
        }

        async fn expired_exports(
            &self,
            user_id: Option<Uuid>,
            limit: i64,
        ) -> Result<Vec<ExportRecord>, ExportError> {
            let now = Utc::now();
            let mut records: Vec<ExportRecord> = self
                .exports
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.expires_at < now && user_id.map_or(true, |u| r.user_id == u))
                .cloned()
                .collect();
            records.truncate(limit as usize);
            Ok(records)
        }

        async fn failed_exports_before(
            &self,
            cutoff: DateTime<Utc>,
            limit: i64,
        ) -> Result<Vec<ExportRecord>, ExportError> {
            let mut records: Vec<ExportRecord> = self
                .exports
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.status == ExportStatus::Failed && r.created_at < cutoff)
                .cloned()
                .collect();
            records.truncate(limit as usize);
            Ok(records)
        }

        async fn exports_for_user(
            &self,
            user_id: Uuid,
        ) -> Result<Vec<ExportRecord>, ExportError> {
            Ok(self
                .exports
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn create_bulk_export(&self, record: &BulkExportRecord) -> Result<(), ExportError> {
            self.bulk_exports
                .lock()
                .unwrap()
                .insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn get_bulk_export(
            &self,
            bulk_export_id: &str,
            user_id: Option<Uuid>,
        ) -> Result<BulkExportRecord, ExportError> {
            let record = self
                .bulk_exports
                .lock()
                .unwrap()
                .get(bulk_export_id)
                .cloned()
                .ok_or_else(|| ExportError::NotFound {
                    export_id: bulk_export_id.to_string(),
                })?;
            if let Some(user_id) = user_id {
                if record.user_id != user_id {
                    return Err(ExportError::Unauthorized {
                        export_id: bulk_export_id.to_string(),
                        user_id: user_id.to_string(),
                    });
                }
            }
            Ok(record)
        }

        async fn update_bulk_export_progress(
            &self,
            bulk_export_id: &str,
            status: ExportStatus,
            progress: i32,
            file_size: Option<i64>,
            error_message: Option<String>,
        ) -> Result<(), ExportError> {
            let mut bulk = self.bulk_exports.lock().unwrap();
            if let Some(record) = bulk.get_mut(bulk_export_id) {
                if record.status.is_terminal() {
                    return Ok(());
                }
                record.status = status;
                record.progress = progress;
                record.updated_at = Some(Utc::now());
                if file_size.is_some() {
                    record.file_size = file_size;
                }
                if error_message.is_some() {
                    record.error_message = error_message;
                }
                if status == ExportStatus::Completed {
                    record.completed_at = Some(Utc::now());
                }
            }
            Ok(())
        }

        async fn increment_bulk_download_count(
            &self,
            bulk_export_id: &str,
        ) -> Result<(), ExportError> {
            if let Some(record) = self.bulk_exports.lock().unwrap().get_mut(bulk_export_id) {
                record.download_count += 1;
                record.last_downloaded_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn delete_bulk_export(&self, bulk_export_id: &str) -> Result<(), ExportError> {
            self.bulk_exports.lock().unwrap().remove(bulk_export_id);
            Ok(())
        }

        async fn expired_bulk_exports(
            &self,
            limit: i64,
        ) -> Result<Vec<BulkExportRecord>, ExportError> {
            let now = Utc::now();
            let mut records: Vec<BulkExportRecord> = self
                .bulk_exports
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.expires_at < now)
                .cloned()
                .collect();
            records.truncate(limit as usize);
            Ok(records)
        }

        async fn bulk_exports_for_user(
            &self,
            user_id: Uuid,
        ) -> Result<Vec<BulkExportRecord>, ExportError> {
            Ok(self
                .bulk_exports
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn all_artifact_paths(&self) -> Result<HashSet<String>, ExportError> {
            let mut paths: HashSet<String> = self
                .exports
                .lock()
                .unwrap()
                .values()
                .map(|r| r.file_path.clone())
                .collect();
            paths.extend(
                self.bulk_exports
                    .lock()
                    .unwrap()
                    .values()
                    .map(|r| r.zip_path.clone()),
            );
            Ok(paths)
        }

        async fn increment_usage(
            &self,
            user_id: Uuid,
            month: NaiveDate,
            now: DateTime<Utc>,
        ) -> Result<(), ExportError> {
            self.usage
                .lock()
                .unwrap()
                .entry((user_id, month))
                .and_modify(|row| {
                    row.count += 1;
                    row.last_export = now;
                })
                .or_insert(ExportUsageRow {
                    user_id,
                    month,
                    count: 1,
                    first_export: now,
                    last_export: now,
                });
            Ok(())
        }

        async fn monthly_usage(
            &self,
            user_id: Uuid,
            month: NaiveDate,
        ) -> Result<i64, ExportError> {
            Ok(self
                .usage
                .lock()
                .unwrap()
                .get(&(user_id, month))
                .map(|row| row.count as i64)
                .unwrap_or(0))
        }

        async fn delete_usage_before(
            &self,
            cutoff: NaiveDate,
            _limit: i64,
        ) -> Result<u64, ExportError> {
            let mut usage = self.usage.lock().unwrap();
            let before = usage.len();
            usage.retain(|(_, month), _| *month >= cutoff);
            Ok((before - usage.len()) as u64)
        }

        async fn delete_usage_for_user(&self, user_id: Uuid) -> Result<u64, ExportError> {
            let mut usage = self.usage.lock().unwrap();
            let before = usage.len();
            usage.retain(|(uid, _), _| *uid != user_id);
            Ok((before - usage.len()) as u64)
        }

        async fn resume_for_export(
            &self,
            resume_id: Uuid,
            user_id: Uuid,
        ) -> Result<ResumeRow, ExportError> {
            let resume = self
                .resumes
                .lock()
                .unwrap()
                .get(&resume_id)
                .cloned()
                .ok_or_else(|| ExportError::ResumeNotFound {
                    resume_id: resume_id.to_string(),
                })?;
            if resume.user_id != user_id {
                return Err(ExportError::Unauthorized {
                    export_id: resume_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
            if resume.is_deleted() {
                return Err(ExportError::ResumeDeleted {
                    resume_id: resume_id.to_string(),
                });
            }
            Ok(resume)
        }

        async fn resume_title(&self, resume_id: Uuid) -> String {
            match self.resumes.lock().unwrap().get(&resume_id) {
                Some(resume) if resume.is_deleted() => format!("{} (Deleted)", resume.title),
                Some(resume) => resume.title.clone(),
                None => "Deleted Resume".to_string(),
            }
        }

        async fn update_resume_export_status(
            &self,
            resume_id: Uuid,
            is_subscribed: bool,
        ) -> Result<(), ExportError> {
            if let Some(resume) = self.resumes.lock().unwrap().get_mut(&resume_id) {
                resume.export_status = Some(
                    if is_subscribed { "subscribed" } else { "paid" }.to_string(),
                );
                resume.last_exported_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRow>, ExportError> {
            Ok(self.users.lock().unwrap().get(&user_id).cloned())
        }

        async fn export_statistics(&self) -> Result<ExportStatistics, ExportError> {
            let exports = self.exports.lock().unwrap();
            let bulk = self.bulk_exports.lock().unwrap();
            let now = Utc::now();
            let thirty_days_ago = now - Duration::days(30);

            let mut stats = ExportStatistics {
                total_exports: exports.len() as i64,
                total_bulk_exports: bulk.len() as i64,
                ..ExportStatistics::default()
            };
            let mut total_size = 0i64;
            let mut sized = 0i64;
            for record in exports.values() {
                if record.created_at >= thirty_days_ago {
                    stats.recent_exports_30d += 1;
                }
                match record.status {
                    ExportStatus::Processing => stats.by_status.processing += 1,
                    ExportStatus::Completed => stats.by_status.completed += 1,
                    ExportStatus::Failed => stats.by_status.failed += 1,
                }
                if let Some(size) = record.file_size {
                    total_size += size;
                    sized += 1;
                }
                if record.expires_at < now {
                    stats.expired_exports += 1;
                }
            }
            stats.total_file_size = total_size;
            stats.average_file_size = if sized > 0 {
                total_size as f64 / sized as f64
            } else {
                0.0
            };
            stats.recent_bulk_exports_30d = bulk
                .values()
                .filter(|r| r.created_at >= thirty_days_ago)
                .count() as i64;
            Ok(stats)
        }
    }
}
