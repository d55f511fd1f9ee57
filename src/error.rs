//! Error types for the keypad assistant

use thiserror::Error;

/// Result type alias for keypad assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the keypad assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Recording device could not start or record
    #[error("audio device error: {0}")]
    Device(String),

    /// Timeout, connection failure, or non-success status from the server
    #[error("network error: {0}")]
    Network(String),

    /// Server reply could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Local check failed before anything went over the wire
    #[error("precondition failed: {0}")]
    Precondition(String),

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
