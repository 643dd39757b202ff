//! The two git services exposed over smart HTTP.

use crate::pktline::PktLineWriter;
use crate::{GitError, Result};
use std::fmt;
use std::str::FromStr;

/// A git service that can be run against a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// `git-upload-pack`: fetch and clone.
    UploadPack,
    /// `git-receive-pack`: push.
    ReceivePack,
}

impl Service {
    /// Parses a service name, with or without the `git-` prefix.
    pub fn parse(name: &str) -> Result<Self> {
        match name.strip_prefix("git-").unwrap_or(name) {
            "upload-pack" => Ok(Self::UploadPack),
            "receive-pack" => Ok(Self::ReceivePack),
            _ => Err(GitError::UnknownService(name.to_string())),
        }
    }

    /// Subcommand name passed to the engine, e.g. `upload-pack`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }

    /// Name used on the wire, e.g. `git-upload-pack`.
    pub fn service_name(self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Content type of the `info/refs` response.
    pub fn advertisement_content_type(self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    /// Content type of the RPC response.
    pub fn result_content_type(self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }

    /// The `# service=...` line plus flush that precedes an advertisement.
    pub fn preamble(self) -> Result<Vec<u8>> {
        let mut writer = PktLineWriter::new(Vec::new());
        writer.write_line(&format!("# service={}", self.service_name()))?;
        writer.flush_pkt()?;
        Ok(writer.into_inner())
    }
}

impl FromStr for Service {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}
