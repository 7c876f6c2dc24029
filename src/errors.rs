use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("session expired")]
    SessionExpired,

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("token store did not answer within {0:?}")]
    StoreTimeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Infrastructure failures that a caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreTimeout(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::SessionExpired | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::StoreTimeout(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, code, msg) = match &self {
            AppError::Forbidden => (
                "permission_error",
                "FORBIDDEN",
                "forbidden".to_string(),
            ),
            AppError::BadRequest(reason) => (
                "invalid_request_error",
                "BAD_REQUEST",
                reason.clone(),
            ),
            AppError::NotFound => ("not_found_error", "NOT_FOUND", "not found".to_string()),
            AppError::SessionExpired => (
                "authentication_error",
                "SESSION_EXPIRED",
                "session expired".to_string(),
            ),
            AppError::Unauthorized => (
                "authentication_error",
                "UNAUTHORIZED",
                "invalid or missing token".to_string(),
            ),
            AppError::StoreTimeout(limit) => {
                tracing::error!(timeout_ms = limit.as_millis() as u64, "token store timed out");
                ("internal_error", "DEFAULT", "internal server error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                ("internal_error", "DEFAULT", "internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        let mut response = (status, body).into_response();

        if self.is_retryable() {
            response.headers_mut().insert(
                "retry-after",
                axum::http::HeaderValue::from_static("1"),
            );
        }

        response
    }
}

/// Malformed or mistyped JSON bodies are ordinary bad requests.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_domain_errors_map_to_statuses() {
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::SessionExpired.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_infrastructure_errors_are_opaque() {
        let resp = AppError::Internal(anyhow::anyhow!("connection refused to 10.0.0.3")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get("retry-after").is_none());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = AppError::StoreTimeout(Duration::from_millis(50));
        assert!(err.is_retryable());
        assert!(!AppError::Forbidden.is_retryable());
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers().get("retry-after").unwrap(), "1");
    }
}
