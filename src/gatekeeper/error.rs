//! Rejection taxonomy for gated requests.
//!
//! Every variant maps to exactly one status code and one stable message.
//! Internal detail carried by `StorageFailure` and `ConfigMissing` is logged,
//! never rendered into a response body.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::observability::metrics;

/// Why a request was refused.
#[derive(Debug, Error)]
pub enum GateError {
    /// No session cookie, or an empty one.
    #[error("missing session credential")]
    AccessDenied,

    /// Malformed, expired, wrongly signed, or wrong-algorithm token.
    #[error("invalid session token")]
    InvalidToken,

    /// The client address could not be turned into a limiter key.
    #[error("cannot derive client key from {0:?}")]
    BadClientIdentity(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// A supplied path resolved outside the caller's root.
    #[error("path escapes the user root")]
    PathEscape,

    #[error("path not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("request deadline exceeded")]
    Timeout,

    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    #[error("maintenance mode active")]
    Maintenance,
}

/// JSON body of every rejection and of plain success replies.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl GateError {
    /// Wrap an I/O error, keeping the detail for the server log.
    pub fn storage(context: &str, err: std::io::Error) -> Self {
        GateError::StorageFailure(format!("{}: {}", context, err))
    }

    /// Map an I/O error from a file operation on an already contained path.
    pub fn from_io(context: &str, err: std::io::Error) -> Self {
        match err.kind() {
            // A file standing where a directory was expected.
            std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory => GateError::NotFound,
            _ => GateError::storage(context, err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GateError::AccessDenied | GateError::InvalidToken => StatusCode::UNAUTHORIZED,
            GateError::BadClientIdentity(_) | GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GateError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GateError::PathEscape => StatusCode::FORBIDDEN,
            GateError::NotFound => StatusCode::NOT_FOUND,
            GateError::StorageFailure(_) | GateError::ConfigMissing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GateError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GateError::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message shown to the caller.
    pub fn public_message(&self) -> &str {
        match self {
            GateError::AccessDenied => "Access Denied",
            GateError::InvalidToken => "Invalid Token",
            GateError::BadClientIdentity(_) => "Bad client identity",
            GateError::RateLimitExceeded => "Too many requests. Rate limit exceeded",
            GateError::PathEscape => "Access denied",
            GateError::NotFound => "Path not found",
            GateError::BadRequest(msg) => msg,
            GateError::StorageFailure(_) | GateError::ConfigMissing(_) => "Internal Server Error",
            GateError::Timeout => "request timeout",
            GateError::Maintenance => {
                "The server is currently under maintenance. Please try again later."
            }
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::AccessDenied => "access_denied",
            GateError::InvalidToken => "invalid_token",
            GateError::BadClientIdentity(_) => "bad_client_identity",
            GateError::RateLimitExceeded => "rate_limited",
            GateError::PathEscape => "path_escape",
            GateError::NotFound => "not_found",
            GateError::BadRequest(_) => "bad_request",
            GateError::StorageFailure(_) => "storage_failure",
            GateError::Timeout => "timeout",
            GateError::ConfigMissing(_) => "config_missing",
            GateError::Maintenance => "maintenance",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match &self {
            GateError::StorageFailure(detail) => {
                tracing::error!(detail = %detail, "Storage failure");
            }
            GateError::ConfigMissing(detail) => {
                tracing::error!(detail = %detail, "Configuration missing");
            }
            GateError::BadClientIdentity(raw) => {
                tracing::warn!(client = %raw, "Invalid client address");
            }
            _ => {}
        }
        metrics::record_rejection(self.reason());

        let status = self.status();
        let body = MessageBody {
            message: self.public_message().to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if matches!(self, GateError::RateLimitExceeded) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
