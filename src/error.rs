//! Error types for Reportline
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.
//!
//! The four request-facing classes are `Transport`/`Timeout`,
//! `Authorization`, `Renewal`, and `Application`. Only `Authorization` is
//! ever intercepted by the client pipeline; every other class reaches the
//! caller untouched.

use thiserror::Error;

/// Main error type for Reportline operations
#[derive(Error, Debug)]
pub enum ReportlineError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection-level failure (DNS, refused connection, broken stream)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request exceeded the configured timeout
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The server answered `401 Unauthorized`
    #[error("Authorization failed for {path}: {message}")]
    Authorization {
        /// Request path that was rejected
        path: String,
        /// Server-provided detail, if any
        message: String,
    },

    /// Credential renewal failed; the session has been cleared
    #[error("Credential renewal failed: {0}")]
    Renewal(String),

    /// Any other non-success HTTP status
    #[error("Request failed with status {status}: {body}")]
    Application {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the server
        body: String,
    },

    /// A request payload failed local validation before being sent
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Credential store errors that are not keyring-specific
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl ReportlineError {
    /// Returns `true` for connection failures and timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Returns `true` for an unrecovered `401 Unauthorized`.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }

    /// Returns `true` when credential renewal failed.
    pub fn is_renewal(&self) -> bool {
        matches!(self, Self::Renewal(_))
    }
}

/// Result type alias for Reportline operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Use
/// `err.downcast_ref::<ReportlineError>()` to classify a failure.
pub type Result<T> = anyhow::Result<T>;
