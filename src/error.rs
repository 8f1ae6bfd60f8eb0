// Error types for the explorer data-access layer.
// Covers transport failures, rate limiting, cancellation, cooldowns and parsing.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Every failure the data-access layer can surface.
///
/// The enum is `Clone` so one settled outcome can be handed to every caller
/// sharing a de-duplicated request; foreign errors are kept behind `Arc`.
#[derive(Error, Debug, Clone)]
pub enum ExplorerError {
    /// Non-2xx response, with the server's message when it sent one.
    #[error("{message}")]
    Transport { status: u16, message: String },

    #[error("Rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Request was aborted")]
    Aborted,

    #[error("Request on cooldown for: {key}")]
    CooldownActive { key: String, remaining: Duration },

    /// Malformed or unexpected body on an otherwise successful response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ExplorerError {
    fn from(err: reqwest::Error) -> Self {
        ExplorerError::Network(Arc::new(err))
    }
}

impl From<serde_json::Error> for ExplorerError {
    fn from(err: serde_json::Error) -> Self {
        ExplorerError::Json(Arc::new(err))
    }
}

impl From<std::io::Error> for ExplorerError {
    fn from(err: std::io::Error) -> Self {
        ExplorerError::Io(Arc::new(err))
    }
}

impl ExplorerError {
    /// Build a transport error from a status code, synthesizing the message if absent.
    pub fn http(status: u16, message: Option<String>) -> Self {
        ExplorerError::Transport {
            status,
            message: message.unwrap_or_else(|| format!("HTTP error {}", status)),
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Cancellation, cooldown rejections, contract violations and client
    /// errors (other than 408/429) are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExplorerError::Transport { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ExplorerError::RateLimited { .. } | ExplorerError::Network(_) => true,
            ExplorerError::Aborted
            | ExplorerError::CooldownActive { .. }
            | ExplorerError::Parse(_)
            | ExplorerError::Json(_)
            | ExplorerError::Io(_)
            | ExplorerError::Config(_)
            | ExplorerError::Other(_) => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExplorerError::RateLimited { .. })
            || matches!(self, ExplorerError::Transport { status: 429, .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ExplorerError::Aborted)
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, ExplorerError::CooldownActive { .. })
    }

    /// Server-mandated wait, if this error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExplorerError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
