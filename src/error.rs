use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Expected contention, mapped to 503, never an internal error
    #[error("garbage collector already running")]
    CollectorBusy,

    // --- Store errors ---
    #[error("storage is not open")]
    StorageClosed,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("malformed persisted value for `{key}`: {reason}")]
    Parse { key: String, reason: String },

    #[error("storage error: {0}")]
    Store(#[from] sled::Error),

    // --- Engine errors ---
    #[error("garbage-collect command failed: {stderr}")]
    CollectorExecutionFailed { stderr: String },

    #[error("docker {action} {container} failed: {stderr}")]
    ContainerSwapFailed {
        action: &'static str,
        container: String,
        stderr: String,
    },

    #[error("timed out waiting for in-flight collection to finish")]
    ShutdownTimedOut,

    // --- Collaborator errors ---
    #[error("invalid blob digest: {0}")]
    DigestInvalid(String),

    #[error("registry API returned {0}")]
    UpstreamStatus(StatusCode),

    #[error("registry API request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("assembling proxied response failed: {0}")]
    Http(#[from] axum::http::Error),

    #[error("invalid cron spec: {0}")]
    Schedule(#[from] cron::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::CollectorBusy => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamStatus(code) => *code,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, self.to_string()).into_response()
    }
}
