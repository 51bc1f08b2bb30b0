//! Error types for spelldrill

use std::io;
use thiserror::Error;

/// Main error type for spelldrill
#[derive(Error, Debug)]
pub enum DrillError {
    /// The platform has no usable speech synthesis at all.
    /// Surfaced once at startup; playback controls are disabled after this.
    #[error("Speech synthesis unavailable: {0}")]
    SpeechUnsupported(String),

    /// Attempted to speak empty or whitespace-only text.
    /// Rejected before anything reaches the synthesis device.
    #[error("Refusing to speak empty text")]
    EmptyInput,

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for spelldrill operations
pub type Result<T> = std::result::Result<T, DrillError>;

impl From<serde_json::Error> for DrillError {
    fn from(e: serde_json::Error) -> Self {
        DrillError::Store(format!("JSON error: {}", e))
    }
}
