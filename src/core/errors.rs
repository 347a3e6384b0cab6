// src/core/errors.rs

//! Defines the primary error type for the entire controller.

use thiserror::Error;

/// The main error enum, representing all possible failures within the controller.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OtterError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error: code {code}")]
    Api {
        code: u16,
        body: String,
        headers: Vec<(String, String)>,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authentication service unavailable: {0}")]
    AuthenticationUnavailable(String),

    #[error("Update already in progress for {0}")]
    UpdateInProgress(String),

    #[error("Cannot execute scaling policy: {reason} (audit {audit_id})")]
    CannotExecutePolicy { reason: String, audit_id: String },

    #[error("No such scaling group: {0}")]
    NoSuchScalingGroup(String),

    #[error("No such scaling policy: {0}")]
    NoSuchPolicy(String),

    #[error("Stale scaling policy version: {0}")]
    StalePolicy(String),

    #[error("Lock {0} is held by another claim")]
    BusyLock(String),

    #[error("Timed out acquiring lock {0}")]
    LockTimeout(String),

    #[error("Coordination session lost")]
    SessionLost,

    #[error("No endpoint for service '{service}' in region '{region}'")]
    NoSuchEndpoint { service: String, region: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OtterError {
    /// Convenience accessor for the HTTP status of an `Api` error, if any.
    pub fn api_code(&self) -> Option<u16> {
        match self {
            OtterError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<reqwest::Error> for OtterError {
    fn from(e: reqwest::Error) -> Self {
        OtterError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for OtterError {
    fn from(e: serde_json::Error) -> Self {
        OtterError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<url::ParseError> for OtterError {
    fn from(e: url::ParseError) -> Self {
        OtterError::InvalidRequest(format!("invalid URL: {e}"))
    }
}

impl From<std::io::Error> for OtterError {
    fn from(e: std::io::Error) -> Self {
        OtterError::Internal(format!("IO error: {e}"))
    }
}
