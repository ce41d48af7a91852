//! JSON error responses for the web adapter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::domain::error::ScopeError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &ScopeError) -> StatusCode {
    match err {
        ScopeError::UnknownIndicator(_)
        | ScopeError::UnknownSegment(_)
        | ScopeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ScopeError::NotFound(_) => StatusCode::NOT_FOUND,
        ScopeError::Database { .. }
        | ScopeError::DatabaseQuery { .. }
        | ScopeError::SchemaGap { .. }
        | ScopeError::ConfigParse { .. }
        | ScopeError::ConfigMissing { .. }
        | ScopeError::ConfigInvalid { .. }
        | ScopeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ScopeError> for WebError {
    fn from(err: ScopeError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_are_client_errors() {
        assert_eq!(
            status_from_error(&ScopeError::UnknownSegment("LSE".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_from_error(&ScopeError::NotFound("instrument X".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn store_failures_are_server_errors() {
        let err: WebError = ScopeError::DatabaseQuery {
            reason: "disk I/O error".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("disk I/O error"));
    }
}
