//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::FutureExt;
use gitway_git::{EngineExit, EngineProcess, EngineRequest, GitEngine, Result};
use gitway_node::config::ServerConfig;
use gitway_node::router::{create_router, AppState};
use parking_lot::Mutex;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Canned advertisement returned by [`FakeEngine`].
pub const FAKE_ADVERTISEMENT: &[u8] =
    b"003fbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb refs/heads/main\n0000";

/// In-memory engine that records every spawn.
///
/// Advertisements return [`FAKE_ADVERTISEMENT`]; stateless RPC echoes the
/// request body back prefixed with `ack:`.
#[derive(Default)]
pub struct FakeEngine {
    pub spawned: Mutex<Vec<(&'static str, EngineRequest)>>,
}

impl FakeEngine {
    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }
}

#[async_trait]
impl GitEngine for FakeEngine {
    async fn advertise(&self, request: &EngineRequest) -> Result<EngineProcess> {
        self.spawned.lock().push(("advertise", request.clone()));
        Ok(EngineProcess {
            stdin: None,
            stdout: Box::pin(Cursor::new(FAKE_ADVERTISEMENT.to_vec())),
            exit: futures::future::ready(Ok(EngineExit { code: Some(0) })).boxed(),
        })
    }

    async fn stateless_rpc(&self, request: &EngineRequest) -> Result<EngineProcess> {
        self.spawned.lock().push(("stateless_rpc", request.clone()));

        let (stdin, mut engine_in) = tokio::io::duplex(64 * 1024);
        let (mut engine_out, stdout) = tokio::io::duplex(64 * 1024);
        let echo = tokio::spawn(async move {
            let mut input = Vec::new();
            engine_in.read_to_end(&mut input).await?;
            engine_out.write_all(b"ack:").await?;
            engine_out.write_all(&input).await?;
            engine_out.shutdown().await
        });

        Ok(EngineProcess {
            stdin: Some(Box::pin(stdin)),
            stdout: Box::pin(stdout),
            exit: async move {
                let code = match echo.await {
                    Ok(Ok(())) => 0,
                    _ => 1,
                };
                Ok(EngineExit { code: Some(code) })
            }
            .boxed(),
        })
    }
}

/// Creates an empty directory shaped like a bare repository.
pub fn make_bare_repo(root: &Path, name: &str) {
    let repo = root.join(name);
    std::fs::create_dir_all(repo.join("objects")).unwrap();
    std::fs::create_dir_all(repo.join("refs")).unwrap();
    std::fs::write(repo.join("HEAD"), "ref: refs/heads/main\n").unwrap();
}

/// Repository root with `demo.git`, plus a router over a [`FakeEngine`].
pub struct TestApp {
    pub dir: TempDir,
    pub engine: Arc<FakeEngine>,
    pub router: axum::Router,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(|_| {})
}

pub fn create_test_app_with(configure: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = TempDir::new().unwrap();
    make_bare_repo(dir.path(), "demo.git");

    let mut config = ServerConfig::new(dir.path());
    configure(&mut config);

    let engine = Arc::new(FakeEngine::default());
    let router = create_router(AppState::new(config, engine.clone()));

    TestApp {
        dir,
        engine,
        router,
    }
}

pub async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}
