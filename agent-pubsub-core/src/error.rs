//! Error types for agent-pubsub

use thiserror::Error;

/// The main error type for agent-pubsub operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation attempted on a channel that has been closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// The registry holds no channel with this id
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// An input request is already in flight for this session
    #[error("Input already pending: {0}")]
    InputPending(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// A specialized Result type for agent-pubsub operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
