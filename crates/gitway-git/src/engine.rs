//! The external engine that actually speaks the pack protocol.
//!
//! Gitway delegates all object and ref handling to git itself. A
//! [`GitEngine`] starts one process per exchange and hands back its pipes;
//! the HTTP layer only moves bytes between the client and those pipes.

use crate::{GitError, Result, Service};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{ChildStderr, Command};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::{debug, warn, Instrument};

/// Boxed reader over an engine's standard output.
pub type EngineReader = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed writer over an engine's standard input.
pub type EngineWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// What to run and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    /// Service to run.
    pub service: Service,
    /// Absolute path of the bare repository.
    pub repo_path: PathBuf,
    /// Value of the client's `Git-Protocol` header, exported as `GIT_PROTOCOL`.
    pub git_protocol: Option<String>,
}

impl EngineRequest {
    /// Creates a request without protocol negotiation hints.
    pub fn new(service: Service, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            service,
            repo_path: repo_path.into(),
            git_protocol: None,
        }
    }

    /// Sets the `GIT_PROTOCOL` value.
    pub fn with_git_protocol(mut self, git_protocol: Option<String>) -> Self {
        self.git_protocol = git_protocol;
        self
    }
}

/// How an engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineExit {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl EngineExit {
    /// Returns true for a zero exit code.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running engine process.
///
/// Dropping `exit` before it resolves kills the process, so whoever owns
/// this value owns the process lifetime.
pub struct EngineProcess {
    /// Standard input; `None` for advertisements, which read nothing.
    pub stdin: Option<EngineWriter>,
    /// Standard output, passed through to the client unmodified.
    pub stdout: EngineReader,
    /// Resolves once the process has exited.
    pub exit: BoxFuture<'static, Result<EngineExit>>,
}

impl std::fmt::Debug for EngineProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProcess")
            .field("stdin", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

/// Capability to run git services against a repository.
#[async_trait]
pub trait GitEngine: Send + Sync + 'static {
    /// Starts a reference advertisement (`--advertise-refs`).
    async fn advertise(&self, request: &EngineRequest) -> Result<EngineProcess>;

    /// Starts the service in stateless-RPC mode, reading the client request on stdin.
    async fn stateless_rpc(&self, request: &EngineRequest) -> Result<EngineProcess>;
}

/// Engine backed by the `git` command-line tool.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    /// Creates an engine that runs `program` (usually `git`).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the program this engine runs.
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn command(&self, request: &EngineRequest, advertise: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(request.service.as_str()).arg("--stateless-rpc");
        if advertise {
            cmd.arg("--advertise-refs");
        }
        cmd.arg(&request.repo_path)
            .current_dir(&request.repo_path)
            .stdin(if advertise {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(protocol) = &request.git_protocol {
            cmd.env("GIT_PROTOCOL", protocol);
        }

        cmd
    }

    fn spawn(&self, request: &EngineRequest, advertise: bool) -> Result<EngineProcess> {
        let mut child = self
            .command(request, advertise)
            .spawn()
            .map_err(|source| GitError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        debug!(
            service = %request.service,
            repo = %request.repo_path.display(),
            pid = ?child.id(),
            advertise,
            "Engine process started"
        );

        let stdin = child
            .stdin
            .take()
            .map(|stdin| Box::pin(stdin) as EngineWriter);
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GitError::Io(std::io::Error::other("stdout pipe not available")))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(
                log_diagnostics(
                    stderr,
                    request.service,
                    request.repo_path.display().to_string(),
                )
                .in_current_span(),
            );
        }

        let exit = async move {
            let status = child.wait().await?;
            Ok(EngineExit {
                code: status.code(),
            })
        }
        .boxed();

        Ok(EngineProcess {
            stdin,
            stdout: Box::pin(stdout),
            exit,
        })
    }
}

#[async_trait]
impl GitEngine for GitCli {
    async fn advertise(&self, request: &EngineRequest) -> Result<EngineProcess> {
        self.spawn(request, true)
    }

    async fn stateless_rpc(&self, request: &EngineRequest) -> Result<EngineProcess> {
        self.spawn(request, false)
    }
}

/// Longest stderr line logged as one event.
const MAX_DIAGNOSTIC_LINE: usize = 8 * 1024;

/// Forwards the engine's stderr to the log; it never reaches the client.
///
/// The pipe is always drained to EOF. Closing it early would kill git with
/// SIGPIPE on its next diagnostic write and cut the client's stream short.
async fn log_diagnostics(stderr: ChildStderr, service: Service, repo: String) {
    let mut lines = FramedRead::new(
        stderr,
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_DIAGNOSTIC_LINE),
    );

    loop {
        let Some(line) = lines.next().await else {
            return;
        };
        match line {
            Ok(line) => {
                let line = String::from_utf8_lossy(&line);
                warn!(service = %service, repo = %repo, "stderr: {}", line.trim_end_matches('\r'));
            }
            Err(e) => {
                debug!(service = %service, repo = %repo, error = %e, "Discarding remaining stderr");
                let mut stderr = lines.into_inner();
                if let Err(e) = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await {
                    debug!(service = %service, repo = %repo, error = %e, "Error draining stderr");
                }
                return;
            }
        }
    }
}
