//! Clone and push through the server with a real `git` client and engine.
//!
//! Skipped when no `git` executable is on the PATH.

use gitway_node::config::ServerConfig;
use gitway_node::router::AppState;
use gitway_node::server::serve;
use std::path::Path;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::oneshot;

async fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Runs git with a clean environment and returns trimmed stdout.
async fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Gitway Test",
            "-c",
            "user.email=test@gitway.invalid",
            "-c",
            "init.defaultBranch=main",
            "-c",
            "protocol.version=2",
        ])
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .output()
        .await
        .expect("failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

struct RunningServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_server(repo_dir: &Path) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::with_git_cli(ServerConfig::new(repo_dir));
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        serve(listener, state, async move {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    RunningServer {
        url: format!("http://{addr}"),
        shutdown: Some(tx),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clone_push_clone() {
    if !git_available().await {
        eprintln!("git not found, skipping");
        return;
    }

    let repos = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    git(repos.path(), &["init", "--bare", "project.git"]).await;
    git(
        &repos.path().join("project.git"),
        &["symbolic-ref", "HEAD", "refs/heads/main"],
    )
    .await;

    let server = start_server(repos.path()).await;
    let url = format!("{}/project.git", server.url);

    // Cloning an empty repository succeeds with nothing checked out.
    git(work.path(), &["clone", &url, "first"]).await;
    let first = work.path().join("first");

    std::fs::write(first.join("README.md"), "# project\n").unwrap();
    git(&first, &["add", "README.md"]).await;
    git(&first, &["commit", "-m", "initial commit"]).await;
    let pushed = git(&first, &["rev-parse", "HEAD"]).await;
    git(&first, &["push", "origin", "HEAD:refs/heads/main"]).await;

    // The identifier without `.git` names the same repository.
    let short_url = format!("{}/project", server.url);
    git(work.path(), &["clone", &short_url, "second"]).await;
    let second = work.path().join("second");

    assert_eq!(git(&second, &["rev-parse", "HEAD"]).await, pushed);
    assert_eq!(
        std::fs::read_to_string(second.join("README.md")).unwrap(),
        "# project\n"
    );

    // A second push on top, fetched into the first clone.
    std::fs::write(second.join("CHANGELOG.md"), "v0.1.0\n").unwrap();
    git(&second, &["add", "CHANGELOG.md"]).await;
    git(&second, &["commit", "-m", "add changelog"]).await;
    let head = git(&second, &["rev-parse", "HEAD"]).await;
    git(&second, &["push", "origin", "main"]).await;

    git(&first, &["fetch", "origin"]).await;
    assert_eq!(git(&first, &["rev-parse", "origin/main"]).await, head);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clone_missing_repository_fails() {
    if !git_available().await {
        eprintln!("git not found, skipping");
        return;
    }

    let repos = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let server = start_server(repos.path()).await;

    let status = Command::new("git")
        .args(["clone", &format!("{}/nothing.git", server.url), "dest"])
        .current_dir(work.path())
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .await
        .unwrap()
        .status;

    assert!(!status.success());
    assert!(!work.path().join("dest").exists());
}
