//! Error types for the hearth concentrator

use thiserror::Error;

/// Result type alias for hearth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the concentrator
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or capture error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Intent pattern error
    #[error("pattern error: {0}")]
    Pattern(String),

    /// Worker pool task failed to complete
    #[error("worker error: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
