//! Error types for Herald

use thiserror::Error;

/// Result type alias for Herald operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside Herald
///
/// None of these ever cross the command pipeline boundary: handlers and the
/// intent router turn them into reply text. They surface only from adapter
/// construction and front-end startup.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word engine error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Text generator error
    #[error("generator error: {0}")]
    Generator(String),

    /// Home automation or media integration error
    #[error("integration error: {0}")]
    Integration(String),

    /// Scheduler error
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// HTTP API front-end error
    #[error("api error: {0}")]
    Api(String),

    /// A capability that was never configured
    #[error("{0} is not available")]
    Unavailable(&'static str),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
