//! HTTP error responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::error::Error;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body or a field in it is unusable.
    #[error("Invalid request: {0}")]
    BadRequest(String),
    /// The requested data does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The record store failed.
    #[error("Record store error: {0}")]
    Store(String),
    /// Anything else.
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ApiError {
    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// The status code this error is reported with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_invalid_input() {
            return Self::BadRequest(err.to_string());
        }
        match err {
            Error::NotFound { .. } => Self::NotFound(err.to_string()),
            Error::Remote { .. }
            | Error::Auth(_)
            | Error::Timeout { .. }
            | Error::DatabaseQuery(_)
            | Error::DatabaseOpen { .. } => Self::Store(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_bad_request() {
        assert_eq!(
            ApiError::from(Error::EmptyIdentifier).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(Error::invalid_identifier("xyz", "not hex")).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_store_failure_is_bad_gateway() {
        let err = ApiError::from(Error::remote("write /rfid/0A/name", "HTTP 503"));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("write /rfid/0A/name failed: HTTP 503"));
    }

    #[test]
    fn test_not_found_and_internal() {
        let not_found = ApiError::from(Error::NotFound {
            path: "/rfid".to_string(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(Error::internal("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::bad_request("uid is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Invalid request: uid is required");
    }
}
