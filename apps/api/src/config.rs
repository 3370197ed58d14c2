use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::models::export::SubscriptionPlan;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub export: ExportConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            export: ExportConfig::from_env(),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Export subsystem tuning. Paths and the auto-cleanup switch come from the
/// environment; the numeric knobs are compiled-in defaults.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Per-file cap for single exports, in MB.
    pub max_export_size_mb: u64,
    /// Cap for the assembled bulk zip, in MB.
    pub max_bulk_export_size_mb: u64,
    pub export_expiry_hours: i64,
    pub bulk_export_expiry_hours: i64,
    pub free_exports_per_month: i64,
    /// High enough to be effectively unlimited for paying users.
    pub premium_exports_per_month: i64,
    pub max_bulk_resumes: i32,
    pub max_export_retries: u32,
    pub retry_delay_seconds: u64,
    pub cleanup_batch_size: i64,
    pub export_base_path: PathBuf,
    pub temp_export_path: PathBuf,
    pub auto_cleanup_enabled: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            max_export_size_mb: 50,
            max_bulk_export_size_mb: 200,
            export_expiry_hours: 24,
            bulk_export_expiry_hours: 48,
            free_exports_per_month: 3,
            premium_exports_per_month: 100,
            max_bulk_resumes: 20,
            max_export_retries: 3,
            retry_delay_seconds: 5,
            cleanup_batch_size: 100,
            export_base_path: PathBuf::from("exports"),
            temp_export_path: PathBuf::from("temp_exports"),
            auto_cleanup_enabled: true,
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> Self {
        let defaults = ExportConfig::default();
        ExportConfig {
            export_base_path: std::env::var("EXPORT_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_base_path),
            temp_export_path: std::env::var("TEMP_EXPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_export_path),
            auto_cleanup_enabled: std::env::var("AUTO_CLEANUP_ENABLED")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.auto_cleanup_enabled),
            ..defaults
        }
    }

    /// Export limits by subscription plan. Enterprise monthly quota of -1
    /// means unlimited.
    pub fn limits_for(&self, plan: SubscriptionPlan) -> ExportLimits {
        match plan {
            SubscriptionPlan::Free => ExportLimits {
                monthly_exports: self.free_exports_per_month,
                file_size_mb: self.max_export_size_mb,
                export_expiry_hours: self.export_expiry_hours,
                bulk_export_enabled: false,
                max_bulk_resumes: 0,
            },
            SubscriptionPlan::Premium => ExportLimits {
                monthly_exports: self.premium_exports_per_month,
                file_size_mb: self.max_export_size_mb,
                export_expiry_hours: self.export_expiry_hours,
                bulk_export_enabled: true,
                max_bulk_resumes: self.max_bulk_resumes,
            },
            SubscriptionPlan::Enterprise => ExportLimits {
                monthly_exports: -1,
                file_size_mb: self.max_bulk_export_size_mb,
                export_expiry_hours: self.bulk_export_expiry_hours,
                bulk_export_enabled: true,
                max_bulk_resumes: 50,
            },
        }
    }
}

/// A subscription tier's quota tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExportLimits {
    /// -1 = unlimited.
    pub monthly_exports: i64,
    pub file_size_mb: u64,
    pub export_expiry_hours: i64,
    pub bulk_export_enabled: bool,
    pub max_bulk_resumes: i32,
}

impl ExportLimits {
    pub fn is_unlimited(&self) -> bool {
        self.monthly_exports == -1
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.file_size_mb * 1024 * 1024
    }
}
