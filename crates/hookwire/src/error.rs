//! Error types for the hookwire library

use hookwire_proto::FrameError;
use thiserror::Error;

/// Main error type for hookwire operations
#[derive(Debug, Error)]
pub enum HookwireError {
    /// Command endpoint unreachable or returned an error status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Agent replied with something we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame encoding or decoding failed
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Wait aborted because the controller is shutting down
    #[error("Request cancelled")]
    Cancelled,

    /// Injector tool could not be started
    #[error("Inject error: {0}")]
    Inject(String),

    /// Invalid controller configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for HookwireError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Protocol(format!("Invalid response body: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HookwireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {}", err))
    }
}
