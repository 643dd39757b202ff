//! HTTP listener.

use crate::config::ServerConfig;
use crate::observability::metrics_handler;
use crate::router::{create_router, AppState};
use axum::{routing::get, Router};
use std::future::Future;
use std::io;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Serves the git endpoints on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(
        addr = %addr,
        repo_dir = %state.config.repo_dir.display(),
        "Git HTTP server listening"
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Serves `/metrics` on its own listener.
pub async fn serve_metrics(listener: TcpListener) -> io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Metrics endpoint listening");

    let app = Router::new().route("/metrics", get(metrics_handler));
    axum::serve(listener, app).await
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Binds the configured listeners and runs until a shutdown signal.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    if !tokio::fs::metadata(&config.repo_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        warn!(
            repo_dir = %config.repo_dir.display(),
            "Repository directory does not exist; every request will 404 until it is created"
        );
    }

    let listener = TcpListener::bind(config.listen_addr()).await?;

    if let Some(metrics_addr) = config.metrics_addr() {
        let metrics_listener = TcpListener::bind(metrics_addr).await?;
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(metrics_listener).await {
                error!(error = %e, "Metrics endpoint failed");
            }
        });
    }

    let state = AppState::with_git_cli(config);
    serve(listener, state, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}
