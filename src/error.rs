use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use validator::ValidationErrors;

/// Field name -> list of human readable messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failures surfaced by a [`crate::store::Store`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint rejected the write.
    #[error("duplicate value for {field}")]
    Duplicate { field: &'static str },

    /// The all-or-nothing seat check failed: at least one requested seat
    /// is missing, already booked, or was requested twice.
    #[error("one or more seats are unavailable")]
    SeatsUnavailable,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by handlers. Every variant renders as a JSON body with an
/// `error` message and the matching status code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    InvalidInput { message: String, fields: FieldErrors },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Seat conflict. Reported as 400, same as the booking input errors.
    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.into()]);
        AppError::InvalidInput {
            message: "Invalid input.".to_string(),
            fields,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::InvalidInput { message, fields } if !fields.is_empty() => {
                json!({ "error": message, "fields": fields })
            }
            AppError::Internal(cause) => {
                tracing::error!("request failed: {}", cause);
                json!({ "error": "Internal server error." })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field } => {
                AppError::invalid_field(field, format!("An entry with this {} already exists.", field))
            }
            StoreError::SeatsUnavailable => {
                AppError::Conflict("One or more seats do not exist or are already booked.".to_string())
            }
            StoreError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("Invalid value ({}).", e.code),
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }
        AppError::InvalidInput {
            message: "Invalid input.".to_string(),
            fields,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::invalid(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_reported_as_bad_request() {
        let err = AppError::from(StoreError::SeatsUnavailable);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn duplicate_maps_to_field_error() {
        let err = AppError::from(StoreError::Duplicate { field: "bus_number" });
        match err {
            AppError::InvalidInput { fields, .. } => {
                assert!(fields.contains_key("bus_number"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
