//! Error types for the inspection server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::form::EngineError;
use crate::inspection::InspectionError;
use crate::records::StorageError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        details: serde_json::Value,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<InspectionError> for AppError {
    fn from(err: InspectionError) -> Self {
        match err {
            InspectionError::NotFound(_) | InspectionError::UnknownForm(_) => {
                AppError::NotFound(err.to_string())
            }
            InspectionError::UnknownField(_)
            | InspectionError::NotAnImageField(_)
            | InspectionError::ImageLimit { .. }
            | InspectionError::NoTemplate(_) => AppError::BadRequest(err.to_string()),
            InspectionError::ExportInFlight(_) => AppError::Conflict(err.to_string()),
            InspectionError::Validation {
                missing_labels,
                errors,
            } => AppError::Validation {
                message: if missing_labels.is_empty() {
                    "Please fix the highlighted fields".to_string()
                } else {
                    format!("Please fill in: {}", missing_labels.join(", "))
                },
                details: json!({ "missingLabels": missing_labels, "errors": errors }),
            },
            InspectionError::Storage(e) => AppError::from(e),
            InspectionError::Engine(e) => AppError::from(e),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownField(_) => AppError::BadRequest(err.to_string()),
            EngineError::Schema(_) => AppError::Internal(err.to_string()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            AppError::Validation { message, details } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                message,
                Some(details),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            AppError::Storage(e) => match e {
                StorageError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Record not found: {}", id),
                    None,
                ),
                other => {
                    tracing::error!("Storage error: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Storage error".to_string(),
                        None,
                    )
                }
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::ValidationError;

    #[test]
    fn test_inspection_error_status_codes() {
        let status = |err: InspectionError| AppError::from(err).into_response().status();

        assert_eq!(status(InspectionError::NotFound("r".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(InspectionError::UnknownField("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(InspectionError::ExportInFlight("r".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(InspectionError::Validation {
                missing_labels: vec!["Site Name".into()],
                errors: vec![ValidationError {
                    field_id: "site_name".into(),
                    message: "Site Name is required".into(),
                }],
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(InspectionError::Storage(StorageError::Serialization(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_lists_labels() {
        let err = AppError::from(InspectionError::Validation {
            missing_labels: vec!["Report Number".into(), "Inspection Date".into()],
            errors: vec![],
        });
        match err {
            AppError::Validation { message, details } => {
                assert_eq!(message, "Please fill in: Report Number, Inspection Date");
                assert_eq!(details["missingLabels"][1], "Inspection Date");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
