#![allow(dead_code)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Closed error taxonomy for the export subsystem. Every variant carries a
/// machine-readable code and the data its HTTP representation needs; domain
/// errors raised deep in the orchestrator or store propagate unmodified to
/// the boundary, where `status_code()` is the single static mapping.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export limit exceeded. Used {used}/{limit} exports for {plan} plan")]
    LimitExceeded { limit: i64, used: i64, plan: String },

    #[error("Export with ID {export_id} not found")]
    NotFound { export_id: String },

    #[error("Export {export_id} has expired")]
    Expired { export_id: String },

    /// Not a true failure — signals the caller to poll again.
    #[error("Export {export_id} is still processing")]
    Processing { export_id: String },

    #[error("Export {export_id} failed{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Failed {
        export_id: String,
        message: Option<String>,
    },

    #[error("User {user_id} is not authorized to access export {export_id}")]
    Unauthorized { export_id: String, user_id: String },

    #[error("{feature} is a premium feature. Please upgrade your subscription.")]
    PremiumRequired { feature: String },

    #[error("Requested {requested} resumes exceeds maximum {max_allowed} for bulk export")]
    BulkLimitExceeded { requested: usize, max_allowed: i32 },

    #[error("Resume with ID {resume_id} not found")]
    ResumeNotFound { resume_id: String },

    #[error("Resume {resume_id} has been deleted")]
    ResumeDeleted { resume_id: String },

    #[error("File size {size} bytes exceeds maximum {max} bytes")]
    FileSizeExceeded { size: u64, max: u64 },

    #[error("Invalid export format: {format}")]
    InvalidFormat { format: String },

    #[error("File system error during {operation} on {path}: {detail}")]
    FileSystem {
        operation: String,
        path: String,
        detail: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ExportError {
    pub fn filesystem(operation: &str, path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ExportError::FileSystem {
            operation: operation.to_string(),
            path: path.into(),
            detail: err.to_string(),
        }
    }

    /// Stable machine-readable code, included in every error response.
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::LimitExceeded { .. } => "EXPORT_LIMIT_EXCEEDED",
            ExportError::NotFound { .. } => "EXPORT_NOT_FOUND",
            ExportError::Expired { .. } => "EXPORT_EXPIRED",
            ExportError::Processing { .. } => "EXPORT_PROCESSING",
            ExportError::Failed { .. } => "EXPORT_FAILED",
            ExportError::Unauthorized { .. } => "UNAUTHORIZED_EXPORT_ACCESS",
            ExportError::PremiumRequired { .. } => "PREMIUM_FEATURE_REQUIRED",
            ExportError::BulkLimitExceeded { .. } => "BULK_EXPORT_LIMIT_EXCEEDED",
            ExportError::ResumeNotFound { .. } => "RESUME_NOT_FOUND",
            ExportError::ResumeDeleted { .. } => "RESUME_DELETED",
            ExportError::FileSizeExceeded { .. } => "FILE_SIZE_EXCEEDED",
            ExportError::InvalidFormat { .. } => "INVALID_EXPORT_FORMAT",
            ExportError::FileSystem { .. } => "FILE_SYSTEM_ERROR",
            ExportError::Database(_) => "DATABASE_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ExportError::LimitExceeded { .. } => StatusCode::FORBIDDEN,
            ExportError::NotFound { .. } => StatusCode::NOT_FOUND,
            ExportError::Expired { .. } => StatusCode::GONE,
            ExportError::Processing { .. } => StatusCode::ACCEPTED,
            ExportError::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ExportError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            ExportError::PremiumRequired { .. } => StatusCode::FORBIDDEN,
            ExportError::BulkLimitExceeded { .. } => StatusCode::BAD_REQUEST,
            ExportError::ResumeNotFound { .. } => StatusCode::NOT_FOUND,
            ExportError::ResumeDeleted { .. } => StatusCode::GONE,
            ExportError::FileSizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ExportError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,
            ExportError::FileSystem { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ExportError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Export error: {self}");
        }
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string()
            }
        }));
        (status, body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Export(e) => return e.into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Access denied".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_is_static() {
        let cases: Vec<(ExportError, StatusCode)> = vec![
            (
                ExportError::LimitExceeded {
                    limit: 3,
                    used: 3,
                    plan: "free".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ExportError::NotFound {
                    export_id: "x".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ExportError::Expired {
                    export_id: "x".to_string(),
                },
                StatusCode::GONE,
            ),
            (
                ExportError::Processing {
                    export_id: "x".to_string(),
                },
                StatusCode::ACCEPTED,
            ),
            (
                ExportError::Failed {
                    export_id: "x".to_string(),
                    message: None,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ExportError::Unauthorized {
                    export_id: "x".to_string(),
                    user_id: "u".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ExportError::PremiumRequired {
                    feature: "Bulk export".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ExportError::BulkLimitExceeded {
                    requested: 25,
                    max_allowed: 20,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ExportError::ResumeNotFound {
                    resume_id: "r".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ExportError::ResumeDeleted {
                    resume_id: "r".to_string(),
                },
                StatusCode::GONE,
            ),
            (
                ExportError::FileSizeExceeded { size: 2, max: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ExportError::InvalidFormat {
                    format: "odt".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ExportError::filesystem("move_file", "a -> b", "permission denied"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "wrong status for {}", err.code());
        }
    }

    #[test]
    fn test_limit_exceeded_message_carries_usage() {
        let err = ExportError::LimitExceeded {
            limit: 3,
            used: 3,
            plan: "free".to_string(),
        };
        assert_eq!(err.code(), "EXPORT_LIMIT_EXCEEDED");
        assert_eq!(
            err.to_string(),
            "Export limit exceeded. Used 3/3 exports for free plan"
        );
    }

    #[test]
    fn test_failed_message_appends_detail_when_present() {
        let bare = ExportError::Failed {
            export_id: "e1".to_string(),
            message: None,
        };
        assert_eq!(bare.to_string(), "Export e1 failed");

        let detailed = ExportError::Failed {
            export_id: "e1".to_string(),
            message: Some("render crashed".to_string()),
        };
        assert_eq!(detailed.to_string(), "Export e1 failed: render crashed");
    }
}
