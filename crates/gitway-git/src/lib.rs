//! Git smart transport building blocks for Gitway.
//!
//! This crate holds everything below the HTTP layer: the pkt-line framing
//! used by the smart protocol, the two git services that can be exposed,
//! and the [`GitEngine`] capability that runs `upload-pack` and
//! `receive-pack` against a repository on disk.
//!
//! Gitway never interprets pack data itself. The engine's output is passed
//! through to the client byte for byte; only the short advertisement
//! preamble is framed here.

mod engine;
mod error;
mod pktline;
mod service;

pub use engine::{
    EngineExit, EngineProcess, EngineReader, EngineRequest, EngineWriter, GitCli, GitEngine,
};
pub use error::GitError;
pub use pktline::{
    encode_frame, flush_frame, PktLine, PktLineReader, PktLineWriter, MAX_PKT_LEN,
    MAX_PKT_PAYLOAD,
};
pub use service::Service;

/// Result type for git transport operations.
pub type Result<T> = std::result::Result<T, GitError>;
