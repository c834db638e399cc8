//! Unified error handling for the back-office API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::GroupError;

/// Application-level error type for the back-office API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Group administration rejected the request.
    #[error(transparent)]
    Group(#[from] GroupError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or wrong API token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(e) | Self::Group(GroupError::Repository(e)) => repository_status(e),
            Self::Group(GroupError::InvalidDiscount | GroupError::InvalidCategory) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Group(GroupError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Group(GroupError::DefaultGroup) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

const fn repository_status(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Back-office request error"
            );
        }

        // Don't expose internal error details to clients
        let body = match &self {
            _ if status.is_server_error() => json!({ "error": "Internal server error" }),
            Self::Database(RepositoryError::Validation(errors))
            | Self::Group(GroupError::Repository(RepositoryError::Validation(errors))) => json!({
                "error": "Validation failed",
                "fields": errors.0.iter().map(|e| json!({
                    "field": e.field,
                    "message": e.to_string(),
                })).collect::<Vec<_>>(),
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("combination 12".to_string());
        assert_eq!(err.to_string(), "Not found: combination 12");

        let err = AppError::Group(GroupError::InvalidCategory);
        assert_eq!(err.to_string(), "wrong category id");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_group_error_status_codes() {
        assert_eq!(
            get_status(GroupError::InvalidDiscount.into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(get_status(GroupError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(get_status(GroupError::DefaultGroup.into()), StatusCode::CONFLICT);
        assert_eq!(
            get_status(GroupError::Repository(RepositoryError::NotFound).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_repository_error_status_codes() {
        assert_eq!(
            get_status(RepositoryError::Conflict("duplicate".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::DataCorruption("bad row".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
