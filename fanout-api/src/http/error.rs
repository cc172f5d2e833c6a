// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert SFU errors to HTTP errors
impl From<fanout_sfu::Error> for AppError {
    fn from(err: fanout_sfu::Error) -> Self {
        use fanout_sfu::Error;

        match err {
            Error::Protocol(msg) => Self::bad_request(msg),
            Error::Serialization(e) => Self::bad_request(format!("JSON error: {e}")),
            Error::Engine(e) => {
                tracing::error!("Engine error: {}", e);
                Self::internal_server_error("Media engine error")
            }
            other => {
                tracing::error!("SFU error: {}", other);
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

/// Convert template rendering errors to HTTP errors
impl From<handlebars::RenderError> for AppError {
    fn from(err: handlebars::RenderError) -> Self {
        tracing::error!("Template error: {}", err);
        Self::internal_server_error("Failed to render page")
    }
}

/// Convert page data serialization errors to HTTP errors
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("Serialization error: {}", err);
        Self::internal_server_error("Failed to render page")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_is_bad_request() {
        let err = AppError::from(fanout_sfu::Error::Protocol("unexpected offer".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "unexpected offer");
    }

    #[test]
    fn test_signaling_error_is_internal() {
        let err = AppError::from(fanout_sfu::Error::Signaling("closed".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "500 Internal Server Error: Internal server error");
    }
}
