//! Error types for the consumer access provider

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for the consumer access provider
pub type Result<T> = std::result::Result<T, Error>;

/// Consumer access provider errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing setting or secret)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authorization server metadata unreachable or incomplete
    #[error("{0}")]
    Discovery(String),

    /// Certificate material unreadable, malformed, or mismatched
    #[error("{0}")]
    Certificate(String),

    /// Non-success response from the authorization or resource server
    #[error("{context}: HTTP {status} - {body}")]
    Upstream {
        /// What the request was for
        context: &'static str,
        /// HTTP status returned upstream
        status: u16,
        /// Response body text
        body: String,
    },

    /// Session missing state expected at this step
    #[error("Session error: {0}")]
    Session(String),

    /// Caller input problem
    #[error("{0}")]
    BadRequest(String),

    /// Caller is not authenticated
    #[error("{0}")]
    Unauthorized(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Build an upstream error from a failed response, consuming its body
    pub async fn upstream(context: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Upstream {
            context,
            status,
            body,
        }
    }

    /// HTTP status used when this error reaches a route boundary
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Upstream body text, if any, for `details` payloads
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::Upstream { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Route-boundary error: a fixed `error` label plus the underlying cause.
///
/// Renders `{"error": label, "message": cause}`.
#[derive(Debug)]
pub struct ApiError {
    /// Short label shown as `error`
    pub error: &'static str,
    /// Underlying cause
    pub source: Error,
}

impl ApiError {
    /// Wrap an error under a route label
    pub fn new(error: &'static str, source: Error) -> Self {
        Self { error, source }
    }

    /// Closure adapter for `map_err`
    pub fn with(error: &'static str) -> impl FnOnce(Error) -> Self {
        move |source| Self::new(error, source)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.source.status_code();
        tracing::error!(error = self.error, cause = %self.source, status = status.as_u16(), "Request failed");
        (
            status,
            Json(json!({
                "error": self.error,
                "message": self.source.to_string(),
            })),
        )
            .into_response()
    }
}
