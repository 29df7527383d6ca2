//! Error types for inspector-agent

use thiserror::Error;

/// Result type alias using inspector-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while driving an agent process.
///
/// These never reach a transport caller: the adapter converts them into a
/// diagnostic log event before finishing the stream.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer (spawn, JSON)
    #[error(transparent)]
    Stream(#[from] inspector_stream::Error),

    /// Waiting on or reading from the child failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic adapter error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if the agent binary could not be found
    pub fn is_program_missing(&self) -> bool {
        match self {
            Error::Stream(e) => e.is_program_missing(),
            _ => false,
        }
    }
}
