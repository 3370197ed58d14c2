//! File Storage Manager — every filesystem side effect of the export
//! subsystem goes through this sandboxed interface.
//!
//! Path segments derived from user-controlled input (user ids, resume ids,
//! titles) must pass through `sanitize_component` before touching a path.
//! Artifacts are staged into scoped temp files and only persisted into the
//! export tree once validated; the `TempArtifact` guard deletes the staging
//! file on every exit path unless ownership is released via `persist`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::errors::ExportError;
use crate::models::export::ExportFormat;

pub struct FileStore {
    base_path: PathBuf,
    temp_path: PathBuf,
}

impl FileStore {
    /// Creates the store and ensures both the export root and the temp
    /// staging directory exist.
    pub fn new(base_path: PathBuf, temp_path: PathBuf) -> Result<Self, ExportError> {
        std::fs::create_dir_all(&base_path)
            .map_err(|e| ExportError::filesystem("create_directory", base_path.display().to_string(), e))?;
        std::fs::create_dir_all(&temp_path)
            .map_err(|e| ExportError::filesystem("create_directory", temp_path.display().to_string(), e))?;
        Ok(FileStore { base_path, temp_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Builds the final artifact path for a single export:
    /// `<base>/<user>/<resume>_<unix_ts>_<token>.<ext>`. The timestamp plus
    /// random suffix keeps concurrent exports of the same resume
    /// collision-free.
    pub fn export_path(&self, user_id: Uuid, resume_id: Uuid, format: ExportFormat) -> PathBuf {
        let safe_user = sanitize_component(&user_id.to_string());
        let safe_resume = sanitize_component(&resume_id.to_string());
        let filename = format!(
            "{}_{}_{}.{}",
            safe_resume,
            Utc::now().timestamp(),
            path_token(),
            format.extension()
        );
        self.base_path.join(safe_user).join(filename)
    }

    /// Final path for a bulk export zip:
    /// `<base>/<user>/bulk_export_<ts>_<token>.zip`.
    pub fn bulk_export_path(&self, user_id: Uuid) -> PathBuf {
        let safe_user = sanitize_component(&user_id.to_string());
        let filename = format!("bulk_export_{}_{}.zip", Utc::now().timestamp(), path_token());
        self.base_path.join(safe_user).join(filename)
    }

    /// Opens a scoped staging file in the temp directory. The file is
    /// removed when the guard drops unless `persist` moves it out.
    pub fn temp_artifact(&self, suffix: &str) -> Result<TempArtifact, ExportError> {
        let file = tempfile::Builder::new()
            .prefix("export_")
            .suffix(suffix)
            .tempfile_in(&self.temp_path)
            .map_err(|e| ExportError::filesystem("create_temp_file", self.temp_path.display().to_string(), e))?;
        Ok(TempArtifact { file })
    }

    pub async fn move_file(&self, source: &Path, destination: &Path) -> Result<(), ExportError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExportError::filesystem("create_directory", parent.display().to_string(), e))?;
        }
        tokio::fs::rename(source, destination).await.map_err(|e| {
            ExportError::filesystem(
                "move_file",
                format!("{} -> {}", source.display(), destination.display()),
                e,
            )
        })
    }

    pub async fn copy_file(&self, source: &Path, destination: &Path) -> Result<(), ExportError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExportError::filesystem("create_directory", parent.display().to_string(), e))?;
        }
        tokio::fs::copy(source, destination).await.map(|_| ()).map_err(|e| {
            ExportError::filesystem(
                "copy_file",
                format!("{} -> {}", source.display(), destination.display()),
                e,
            )
        })
    }

    /// Idempotent delete. Returns whether a file was actually removed;
    /// a missing file is `Ok(false)`, not an error.
    pub async fn delete_file(&self, path: &Path) -> Result<bool, ExportError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("Deleted file: {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ExportError::filesystem("delete_file", path.display().to_string(), e)),
        }
    }

    pub async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Size in bytes; 0 for a missing or unreadable file.
    pub async fn file_size(&self, path: &Path) -> u64 {
        tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    }

    /// True iff the file exists and its size is within `max_size_mb`.
    pub async fn validate_file_size(&self, path: &Path, max_size_mb: u64) -> bool {
        if !self.file_exists(path).await {
            return false;
        }
        self.file_size(path).await <= max_size_mb * 1024 * 1024
    }

    /// Best-effort batch delete. Individual failures are logged and skipped;
    /// the batch never aborts. Returns `(files_deleted, bytes_freed)`.
    pub async fn cleanup_files<I, P>(&self, paths: I) -> (u64, u64)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut files_deleted = 0u64;
        let mut bytes_freed = 0u64;
        for path in paths {
            let path = path.as_ref();
            let size = self.file_size(path).await;
            match self.delete_file(path).await {
                Ok(true) => {
                    files_deleted += 1;
                    bytes_freed += size;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to cleanup file {}: {e}", path.display()),
            }
        }
        (files_deleted, bytes_freed)
    }

    /// Removes every file under a user's export directory, then the
    /// directory itself if empty. Returns `(files_deleted, bytes_freed)`.
    pub async fn cleanup_user_directory(&self, user_id: Uuid) -> (u64, u64) {
        let user_dir = self.base_path.join(sanitize_component(&user_id.to_string()));
        if !user_dir.exists() {
            return (0, 0);
        }

        let mut files_deleted = 0u64;
        let mut bytes_freed = 0u64;
        for entry in WalkDir::new(&user_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    files_deleted += 1;
                    bytes_freed += size;
                }
                Err(e) => warn!("Failed to delete {}: {e}", entry.path().display()),
            }
        }

        // Directory may still hold subdirectories; removal is best-effort.
        let _ = tokio::fs::remove_dir(&user_dir).await;

        (files_deleted, bytes_freed)
    }

    /// Recursive size of a directory tree, tolerant of per-file stat errors.
    pub fn directory_size(&self, path: &Path) -> u64 {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    /// All regular files currently under the export root, with their
    /// modification times. Used by the orphan sweep to diff against the
    /// database's recorded paths.
    pub fn list_artifact_files(&self) -> Vec<(PathBuf, std::time::SystemTime)> {
        WalkDir::new(&self.base_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let mtime = e.metadata().ok()?.modified().ok()?;
                Some((e.into_path(), mtime))
            })
            .collect()
    }

    /// Of the files on disk, returns those absent from `known_paths` and
    /// older than `min_age`.
    pub fn find_orphaned_files(
        &self,
        known_paths: &HashSet<String>,
        min_age: std::time::Duration,
    ) -> Vec<PathBuf> {
        let now = std::time::SystemTime::now();
        self.list_artifact_files()
            .into_iter()
            .filter(|(path, mtime)| {
                let age_ok = now
                    .duration_since(*mtime)
                    .map(|age| age >= min_age)
                    .unwrap_or(false);
                age_ok && !known_paths.contains(&path.display().to_string())
            })
            .map(|(path, _)| path)
            .collect()
    }
}

/// Scoped staging file. Deleted on drop on every exit path — success,
/// error return, or panic — unless `persist` releases ownership by moving
/// the file into its final location.
pub struct TempArtifact {
    file: NamedTempFile,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Moves the staged file into `destination`, creating parent directories
    /// as needed. Consumes the guard; after this the file is owned by its
    /// export record.
    pub fn persist(self, destination: &Path) -> Result<(), ExportError> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExportError::filesystem("create_directory", parent.display().to_string(), e))?;
        }
        let source = self.file.path().display().to_string();
        self.file
            .persist(destination)
            .map(|_| ())
            .map_err(|e| {
                ExportError::filesystem(
                    "move_file",
                    format!("{} -> {}", source, destination.display()),
                    e,
                )
            })
    }
}

fn path_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Strips path-traversal sequences and every character outside
/// `[A-Za-z0-9._-]`, truncates to 50 chars, and falls back to a random
/// 8-char token when nothing survives.
pub fn sanitize_component(component: &str) -> String {
    let stripped = component.replace("..", "").replace(['/', '\\'], "");
    let mut sanitized: String = stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    sanitized.truncate(50);
    if sanitized.is_empty() {
        Uuid::new_v4().to_string()[..8].to_string()
    } else {
        sanitized
    }
}
