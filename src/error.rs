use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

/// Crate-wide error type. Every handler returns `Result<_, ApiError>`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// Identity/payment/storage collaborator failure. Detail is logged,
    /// the caller only sees a generic message.
    #[error("{0}")]
    Provider(String),
    /// Missing or invalid server-side configuration, e.g. an unconfigured
    /// subscription price. Aborts the operation instead of substituting
    /// a default.
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message, code) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, "VALIDATION_ERROR"),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT"),
            ApiError::Provider(msg) => {
                error!(detail = %msg, "external provider failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "External service failure".to_string(),
                    "PROVIDER_ERROR",
                )
            }
            ApiError::Config(msg) => {
                error!(detail = %msg, "configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                    "CONFIGURATION_ERROR",
                )
            }
            ApiError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                    "DATABASE_ERROR",
                )
            }
        };

        let body = ErrorBody {
            error: message,
            code,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let resp = ApiError::Validation("bad name".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn provider_detail_is_not_leaked() {
        let resp = ApiError::Provider("stripe said: secret detail".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn conflict_maps_to_409() {
        let resp = ApiError::Conflict("already subscribed".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
