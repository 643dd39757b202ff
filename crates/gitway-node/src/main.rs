//! Gitway Node - Git smart HTTP server.

use clap::Parser;
use gitway_node::config::ServerConfig;
use gitway_node::observability::{init_logging, LogFormat};
use std::net::IpAddr;
use std::path::PathBuf;

/// Gitway - serve bare git repositories over smart HTTP
#[derive(Parser, Debug)]
#[command(name = "gitway-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gitway.yaml", env = "GITWAY_CONFIG")]
    config: PathBuf,

    /// Directory holding the bare repositories
    #[arg(long, env = "REPO_DIR")]
    repo_dir: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "GITWAY_HOST")]
    host: Option<IpAddr>,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Port for the Prometheus metrics endpoint
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Git executable
    #[arg(long, env = "GIT_BIN")]
    git_bin: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,
}

impl Args {
    /// Applies command-line and environment values over the file config.
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(repo_dir) = self.repo_dir {
            config.repo_dir = repo_dir;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.metrics_port.is_some() {
            config.metrics_port = self.metrics_port;
        }
        if let Some(git_bin) = self.git_bin {
            config.git_bin = git_bin;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(log_format) = self.log_format {
            config.log_format = log_format;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let file_config = ServerConfig::load(&args.config)?;
    let config = args.apply(file_config);

    config.validate()?;
    let log_format: LogFormat = config.log_format.parse().unwrap_or_default();
    init_logging(&config.log_level, log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Gitway node");
    tracing::info!(
        listen_addr = %config.listen_addr(),
        repo_dir = %config.repo_dir.display(),
        git_bin = %config.git_bin.display(),
        upload_pack = config.upload_pack,
        receive_pack = config.receive_pack,
        "Node configuration"
    );

    gitway_node::server::run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_file_config() {
        let args = Args::parse_from([
            "gitway-node",
            "--repo-dir",
            "/srv/git",
            "--port",
            "8081",
        ]);
        let mut file_config = ServerConfig::default();
        file_config.receive_pack = false;

        let config = args.apply(file_config);
        assert_eq!(config.repo_dir, PathBuf::from("/srv/git"));
        assert_eq!(config.port, 8081);
        assert!(!config.receive_pack);
        assert_eq!(config.git_bin, PathBuf::from("git"));
    }

    #[test]
    fn test_args_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
