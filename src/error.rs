use crate::cache::CacheError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    ReplayOrUnknownState(String),
    Unauthenticated(String),
    NotConfigured(String),
    ExchangeFailed { status: u16, body: String },
    RefreshFailed { status: u16, body: String },
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ReplayOrUnknownState(msg) => write!(f, "Unknown auth state: {}", msg),
            AppError::Unauthenticated(msg) => write!(f, "Unauthenticated: {}", msg),
            AppError::NotConfigured(msg) => write!(f, "Not configured: {}", msg),
            AppError::ExchangeFailed { status, body } => {
                write!(f, "Token exchange failed with status {}: {}", status, body)
            }
            AppError::RefreshFailed { status, body } => {
                write!(f, "Token refresh failed with status {}: {}", status, body)
            }
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Internal(format!("HTTP request failed: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("Serialization failed: {}", err))
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Internal(format!("Cache error: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            AppError::ReplayOrUnknownState(_) => (StatusCode::BAD_REQUEST, "Unknown auth state"),
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "Unauthenticated"),
            AppError::NotConfigured(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Not configured"),
            AppError::ExchangeFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Token exchange failed")
            }
            AppError::RefreshFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Token refresh failed")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}
