//! Git transport error types.

use thiserror::Error;

/// Errors that can occur while framing the protocol or driving the engine.
#[derive(Debug, Error)]
pub enum GitError {
    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// Service name that is neither upload-pack nor receive-pack.
    #[error("unsupported service: {0}")]
    UnknownService(String),

    /// The engine process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
