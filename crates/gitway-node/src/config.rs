//! Server configuration.
//!
//! Values come from built-in defaults, then an optional YAML file, then the
//! environment and command line (see `main.rs`). The resulting
//! [`ServerConfig`] is handed to the router and listener explicitly.

use crate::observability::LogFormat;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default request body limit (512 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for [`ServerConfig`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the Gitway server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding the bare repositories.
    pub repo_dir: PathBuf,
    /// Listen address.
    pub host: IpAddr,
    /// Listen port.
    pub port: u16,
    /// Port for the Prometheus endpoint; disabled when unset.
    pub metrics_port: Option<u16>,
    /// Git executable used as the engine.
    pub git_bin: PathBuf,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (pretty or json).
    pub log_format: String,
    /// Largest accepted request body, after gzip decoding.
    pub max_body_bytes: usize,
    /// Serve fetch and clone.
    pub upload_pack: bool,
    /// Serve push.
    pub receive_pack: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("./repositories"),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 6969,
            metrics_port: None,
            git_bin: PathBuf::from("git"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            upload_pack: true,
            receive_pack: true,
        }
    }
}

impl ServerConfig {
    /// Creates a default configuration serving `repo_dir`.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            ..Self::default()
        }
    }

    /// Loads a YAML config file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses a YAML document; missing keys take their defaults.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Checks that the configuration can be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("repo_dir must not be empty".into()));
        }
        if self.git_bin.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("git_bin must not be empty".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".into(),
            ));
        }
        if let Err(e) = self.log_format.parse::<LogFormat>() {
            return Err(ConfigError::Invalid(e));
        }
        if self.port != 0 && self.metrics_port == Some(self.port) {
            return Err(ConfigError::Invalid(
                "metrics_port must differ from port".into(),
            ));
        }
        Ok(())
    }

    /// Address the git endpoint listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Address of the metrics endpoint, if enabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_port.map(|port| SocketAddr::new(self.host, port))
    }
}
