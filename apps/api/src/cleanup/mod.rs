//! Cleanup Scheduler — periodic sweeps over expired, failed, and orphaned
//! artifacts plus stale usage counters.
//!
//! An explicit service object with injected dependencies and a
//! `start`/`stop` lifecycle owned by the composition root. Four timers run
//! four sweep types; every sweep is idempotent and tolerates per-item
//! failures — one bad file never aborts a pass.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::errors::ExportError;
use crate::export::store::ExportStore;
use crate::models::export::CleanupResult;
use crate::storage::FileStore;

const EXPIRED_SWEEP_PERIOD: Duration = Duration::from_secs(60 * 60);
const FAILED_SWEEP_PERIOD: Duration = Duration::from_secs(6 * 60 * 60);
const ORPHAN_SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
const USAGE_SWEEP_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Files younger than this are never treated as orphans — an in-flight
/// export may not have its record visible yet.
const ORPHAN_GRACE: Duration = Duration::from_secs(2 * 24 * 60 * 60);

const USAGE_RETENTION_DAYS: i64 = 365;

#[derive(Clone, Copy, Debug)]
enum Sweep {
    Expired,
    Failed,
    Orphans,
    StaleUsage,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupStats {
    pub expired_exports: i64,
    pub expired_bulk_exports: i64,
    pub failed_exports: i64,
    pub total_disk_usage_bytes: u64,
    pub total_disk_usage_mb: f64,
    pub cleanup_enabled: bool,
    pub last_check: DateTime<Utc>,
}

pub struct CleanupScheduler {
    store: Arc<dyn ExportStore>,
    files: Arc<FileStore>,
    config: ExportConfig,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CleanupScheduler {
    pub fn new(store: Arc<dyn ExportStore>, files: Arc<FileStore>, config: ExportConfig) -> Self {
        CleanupScheduler {
            store,
            files,
            config,
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the four sweep timers. Calling `start` on a scheduler that is
    /// already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().unwrap();
        if !handles.is_empty() {
            return;
        }
        handles.push(self.spawn_loop(EXPIRED_SWEEP_PERIOD, Sweep::Expired));
        handles.push(self.spawn_loop(FAILED_SWEEP_PERIOD, Sweep::Failed));
        handles.push(self.spawn_loop(ORPHAN_SWEEP_PERIOD, Sweep::Orphans));
        handles.push(self.spawn_loop(USAGE_SWEEP_PERIOD, Sweep::StaleUsage));
        info!("Cleanup scheduler started");
    }

    /// Cancels the timers and waits for in-flight sweeps to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        info!("Cleanup scheduler stopped");
    }

    fn spawn_loop(self: &Arc<Self>, period: Duration, sweep: Sweep) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; sweeps run on cadence,
            // not at startup.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => break,
                    _ = interval.tick() => scheduler.run_sweep(sweep).await,
                }
            }
        })
    }

    async fn run_sweep(&self, sweep: Sweep) {
        let result = match sweep {
            Sweep::Expired => self.sweep_expired_exports().await,
            Sweep::Failed => self.sweep_failed_exports().await,
            Sweep::Orphans => self.sweep_orphaned_files().await,
            Sweep::StaleUsage => self.sweep_stale_usage().await,
        };
        match result {
            Ok(outcome) => info!("{sweep:?} sweep completed: {}", outcome.message),
            Err(e) => error!("{sweep:?} sweep failed: {e}"),
        }
    }

    // ── Sweeps ──────────────────────────────────────────────────────────

    /// Pages through records past `expires_at`, deleting files (best-effort)
    /// and then records, until a page comes back short. Covers single and
    /// bulk exports.
    pub async fn sweep_expired_exports(&self) -> Result<CleanupResult, ExportError> {
        let batch_size = self.config.cleanup_batch_size;
        let mut total_deleted = 0u64;
        let mut total_bytes = 0u64;

        loop {
            let expired = self.store.expired_exports(None, batch_size).await?;
            if expired.is_empty() {
                break;
            }

            let paths: Vec<PathBuf> = expired.iter().map(|r| PathBuf::from(&r.file_path)).collect();
            let (deleted, bytes) = self.files.cleanup_files(&paths).await;
            total_deleted += deleted;
            total_bytes += bytes;

            for record in &expired {
                if let Err(e) = self.store.delete_export(&record.id).await {
                    warn!("Failed to delete export record {}: {e}", record.id);
                }
            }

            if (expired.len() as i64) < batch_size {
                break;
            }
        }

        loop {
            let expired = self.store.expired_bulk_exports(batch_size).await?;
            if expired.is_empty() {
                break;
            }

            let paths: Vec<PathBuf> = expired.iter().map(|r| PathBuf::from(&r.zip_path)).collect();
            let (deleted, bytes) = self.files.cleanup_files(&paths).await;
            total_deleted += deleted;
            total_bytes += bytes;

            for record in &expired {
                if let Err(e) = self.store.delete_bulk_export(&record.id).await {
                    warn!("Failed to delete bulk export record {}: {e}", record.id);
                }
            }

            if (expired.len() as i64) < batch_size {
                break;
            }
        }

        Ok(CleanupResult::new(
            format!("Cleaned up {total_deleted} expired exports"),
            total_deleted,
            total_bytes,
        ))
    }

    /// Deletes failed records (and any leftover partial files) older than
    /// twice the export expiry window.
    pub async fn sweep_failed_exports(&self) -> Result<CleanupResult, ExportError> {
        let cutoff = Utc::now() - chrono::Duration::hours(2 * self.config.export_expiry_hours);
        let failed = self
            .store
            .failed_exports_before(cutoff, self.config.cleanup_batch_size)
            .await?;

        let mut cleaned = 0u64;
        for record in &failed {
            let path = PathBuf::from(&record.file_path);
            if let Err(e) = self.files.delete_file(&path).await {
                warn!("Failed to cleanup export {}: {e}", record.id);
            }
            match self.store.delete_export(&record.id).await {
                Ok(()) => cleaned += 1,
                Err(e) => warn!("Failed to cleanup export {}: {e}", record.id),
            }
        }

        Ok(CleanupResult::new(
            format!("Cleaned up {cleaned} failed exports"),
            cleaned,
            0,
        ))
    }

    /// Diffs the export tree on disk against the paths the database knows
    /// about and removes unrecorded files older than the grace period. The
    /// tree is read while other jobs may be writing — the age filter, not a
    /// lock, keeps in-flight artifacts safe.
    pub async fn sweep_orphaned_files(&self) -> Result<CleanupResult, ExportError> {
        self.sweep_orphaned_files_with_grace(ORPHAN_GRACE).await
    }

    async fn sweep_orphaned_files_with_grace(
        &self,
        grace: Duration,
    ) -> Result<CleanupResult, ExportError> {
        let known_paths = self.store.all_artifact_paths().await?;
        let orphans = self.files.find_orphaned_files(&known_paths, grace);
        let (deleted, bytes) = self.files.cleanup_files(&orphans).await;

        Ok(CleanupResult::new(
            format!("Cleaned up {deleted} orphaned files"),
            deleted,
            bytes,
        ))
    }

    /// Drops usage counters older than one year.
    pub async fn sweep_stale_usage(&self) -> Result<CleanupResult, ExportError> {
        let cutoff = (Utc::now() - chrono::Duration::days(USAGE_RETENTION_DAYS)).date_naive();
        let deleted = self
            .store
            .delete_usage_before(cutoff, self.config.cleanup_batch_size)
            .await?;

        Ok(CleanupResult::new(
            format!("Cleaned up {deleted} old usage records"),
            deleted,
            0,
        ))
    }

    // ── Explicit triggers ───────────────────────────────────────────────

    /// Per-user expired-export cleanup, exposed as a user-facing endpoint.
    pub async fn cleanup_user_expired(&self, user_id: Uuid) -> Result<CleanupResult, ExportError> {
        let expired = self
            .store
            .expired_exports(Some(user_id), self.config.cleanup_batch_size)
            .await?;

        let paths: Vec<PathBuf> = expired.iter().map(|r| PathBuf::from(&r.file_path)).collect();
        let (deleted, bytes) = self.files.cleanup_files(&paths).await;

        for record in &expired {
            if let Err(e) = self.store.delete_export(&record.id).await {
                warn!("Failed to delete export record {}: {e}", record.id);
            }
        }

        Ok(CleanupResult::new(
            format!("Cleaned up {deleted} expired exports"),
            deleted,
            bytes,
        ))
    }

    /// Cascade-deletes every export record, bulk record, usage counter, and
    /// artifact file belonging to a user. The one bulk-erase path.
    pub async fn purge_user_data(&self, user_id: Uuid) -> Result<CleanupResult, ExportError> {
        info!("Starting cleanup of all export data for user {user_id}");

        let exports = self.store.exports_for_user(user_id).await?;
        let bulk_exports = self.store.bulk_exports_for_user(user_id).await?;

        let paths: Vec<PathBuf> = exports
            .iter()
            .map(|r| PathBuf::from(&r.file_path))
            .chain(bulk_exports.iter().map(|r| PathBuf::from(&r.zip_path)))
            .collect();
        let (mut deleted, mut bytes) = self.files.cleanup_files(&paths).await;

        for record in &exports {
            if let Err(e) = self.store.delete_export(&record.id).await {
                warn!("Failed to delete export record {}: {e}", record.id);
            }
        }
        for record in &bulk_exports {
            if let Err(e) = self.store.delete_bulk_export(&record.id).await {
                warn!("Failed to delete bulk export record {}: {e}", record.id);
            }
        }

        if let Err(e) = self.store.delete_usage_for_user(user_id).await {
            warn!("Failed to delete usage records for user {user_id}: {e}");
        }

        // Anything left in the user's directory goes with it.
        let (dir_deleted, dir_bytes) = self.files.cleanup_user_directory(user_id).await;
        deleted += dir_deleted;
        bytes += dir_bytes;

        Ok(CleanupResult::new(
            format!("Cleaned up all export data for user {user_id}"),
            deleted,
            bytes,
        ))
    }

    /// Counters for the admin surface: how much is waiting for the sweeps.
    pub async fn stats(&self) -> Result<CleanupStats, ExportError> {
        let statistics = self.store.export_statistics().await?;
        let expired_bulk = self.store.expired_bulk_exports(10_000).await?.len() as i64;
        let disk_usage = self.files.directory_size(self.files.base_path());

        Ok(CleanupStats {
            expired_exports: statistics.expired_exports,
            expired_bulk_exports: expired_bulk,
            failed_exports: statistics.by_status.failed,
            total_disk_usage_bytes: disk_usage,
            total_disk_usage_mb: (disk_usage as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            cleanup_enabled: self.config.auto_cleanup_enabled,
            last_check: Utc::now(),
        })
    }
}
