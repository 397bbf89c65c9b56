//! Unified error types for the round bettor.

use thiserror::Error;

/// Unified error type for the bettor.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Round clock error.
    #[error("timing error: {0}")]
    Timing(#[from] TimingError),

    /// Input file (credentials or preference list) problem.
    #[error("input error: {0}")]
    Input(String),

    /// Platform call error.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Metrics exporter could not be installed.
    #[error("metrics error: {0}")]
    Metrics(String),

    /// HTTP client construction error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classified failure of a single HTTP request.
///
/// Only `Auth` is terminal on its own; the other two variants are retried
/// by [`crate::platform::request::retry`] until attempts run out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Network failure or non-success status other than 401/403.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Credential rejected (401/403).
    #[error("authentication rejected: HTTP {status}")]
    Auth {
        /// HTTP status returned by the platform.
        status: u16,
    },

    /// Empty or malformed response body.
    #[error("malformed response: {0}")]
    Parse(String),
}

impl RequestError {
    /// Whether the retry loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RequestError::Auth { .. })
    }
}

/// Failure of one platform operation, after retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The credential is no longer valid.
    #[error("{operation}: credential rejected (HTTP {status})")]
    Unauthorized {
        /// Operation that failed.
        operation: &'static str,
        /// HTTP status.
        status: u16,
    },

    /// Retries exhausted on a transient or parse failure.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Operation that failed.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// Last failure seen.
        source: RequestError,
    },

    /// Response parsed but lacked the expected data.
    #[error("{operation}: unexpected response: {reason}")]
    Unexpected {
        /// Operation that failed.
        operation: &'static str,
        /// What was missing or wrong.
        reason: String,
    },
}

impl PlatformError {
    /// Whether this failure means the credential itself is dead.
    pub fn is_auth(&self) -> bool {
        matches!(self, PlatformError::Unauthorized { .. })
    }
}

/// Round clock errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingError {
    /// Second offsets must be within 0..=59.
    #[error("second offset {0} is outside 0..=59")]
    InvalidOffset(u8),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
