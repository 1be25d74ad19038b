//! Error types for the widget gateway

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;

pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Outcome of a failed widget request.
///
/// This is the value stored in a cache entry when a fetch fails and the body
/// of every error response the gateway sends. It never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed widget configuration. Never retried.
    #[serde(rename = "config_error")]
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The upstream did not answer within the gateway timeout
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// The upstream answered with a non-success status
    #[error("upstream returned status {code}")]
    UpstreamError { code: u16 },

    /// Connection-level failure (DNS, refused, TLS, reset)
    #[error("upstream unreachable: {message}")]
    UpstreamUnreachable { message: String },

    /// Target origin is not one of the configured services
    #[error("target not allowed: {host}")]
    TargetNotAllowed { host: String },

    #[error("unknown service: {name}")]
    UnknownService { name: String },
}

impl ErrorKind {
    pub fn config(message: impl Into<String>) -> Self {
        ErrorKind::Config {
            message: message.into(),
        }
    }

    /// Transient failures are retried on the next poll tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::UpstreamTimeout
                | ErrorKind::UpstreamError { .. }
                | ErrorKind::UpstreamUnreachable { .. }
        )
    }
}

impl From<reqwest::Error> for ErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ErrorKind::UpstreamTimeout;
        }
        if let Some(status) = err.status() {
            return ErrorKind::UpstreamError {
                code: status.as_u16(),
            };
        }
        // reqwest includes the request URL in its message, and the URL may
        // hold an injected API key.
        ErrorKind::UpstreamUnreachable {
            message: err.without_url().to_string(),
        }
    }
}

impl ResponseError for ErrorKind {
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::Config { .. } => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::UpstreamError { .. } | ErrorKind::UpstreamUnreachable { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::TargetNotAllowed { .. } => StatusCode::FORBIDDEN,
            ErrorKind::UnknownService { .. } => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self }))
    }
}

/// Process-level failures: settings, services file, HTTP client setup.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("services file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
