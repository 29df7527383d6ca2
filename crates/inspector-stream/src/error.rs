//! Error types for inspector-stream

use thiserror::Error;

/// Result type alias using inspector-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or producing agent output
#[derive(Error, Debug)]
pub enum Error {
    /// Reading from or writing to a pipe failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A JSON value that does not carry an event discriminator
    #[error("Not an agent event: {0}")]
    NotAnEvent(String),

    /// The agent process could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a spawn error for the given program
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Check if this error means the agent binary is not installed
    pub fn is_program_missing(&self) -> bool {
        match self {
            Error::Spawn { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
