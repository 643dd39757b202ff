//! Request routing for the smart HTTP endpoints.
//!
//! Every request goes through the same steps: resolve the repository named
//! by the first path segment, then dispatch on the rest of the path. A
//! missing repository is reported before the path is looked at, so a typo
//! in either gives the same 404 a git client expects.

use crate::advertise;
use crate::bridge::{self, git_protocol};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::observability::{trace_request, track_metrics};
use crate::repository::RepoRoot;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Method, Uri},
    middleware,
    response::Response,
    Router,
};
use gitway_git::{GitCli, GitEngine, Service};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Repository resolver for the configured root.
    pub repos: RepoRoot,
    /// Engine that runs the git services.
    pub engine: Arc<dyn GitEngine>,
}

impl AppState {
    /// Creates state around an explicit engine.
    pub fn new(config: ServerConfig, engine: Arc<dyn GitEngine>) -> Self {
        Self {
            repos: RepoRoot::new(config.repo_dir.clone()),
            config: Arc::new(config),
            engine,
        }
    }

    /// Creates state using the configured `git` executable.
    pub fn with_git_cli(config: ServerConfig) -> Self {
        let engine = Arc::new(GitCli::new(config.git_bin.clone()));
        Self::new(config, engine)
    }

    fn ensure_enabled(&self, service: Service) -> Result<(), ApiError> {
        let enabled = match service {
            Service::UploadPack => self.config.upload_pack,
            Service::ReceivePack => self.config.receive_pack,
        };
        if enabled {
            Ok(())
        } else {
            Err(ApiError::ServiceDisabled(service))
        }
    }
}

/// Endpoint addressed by the path after the repository segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/info/refs`
    InfoRefs,
    /// `/git-upload-pack` or `/git-receive-pack`
    Rpc(Service),
}

impl Endpoint {
    /// Maps the remainder of a request path to an endpoint.
    pub fn from_path(rest: &str) -> Option<Self> {
        match rest {
            "/info/refs" => Some(Self::InfoRefs),
            "/git-upload-pack" => Some(Self::Rpc(Service::UploadPack)),
            "/git-receive-pack" => Some(Self::Rpc(Service::ReceivePack)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InfoRefsQuery {
    service: Option<String>,
}

/// Splits `/<repo>/<rest>` into the repository identifier and `/<rest>`.
pub fn split_repo_path(path: &str) -> (&str, &str) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.find('/') {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    }
}

/// Creates the git smart HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(track_metrics))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let (ident, rest) = split_repo_path(uri.path());
    let repo = state.repos.resolve(ident).await?;
    let endpoint = Endpoint::from_path(rest).ok_or(ApiError::BadRequest)?;

    match endpoint {
        Endpoint::InfoRefs => {
            if method != Method::GET && method != Method::HEAD {
                return Err(ApiError::MethodNotAllowed);
            }
            let Query(query) =
                Query::<InfoRefsQuery>::try_from_uri(&uri).map_err(|_| ApiError::BadRequest)?;
            let service = advertise::parse_service(query.service.as_deref())?;
            state.ensure_enabled(service)?;

            advertise::info_refs(
                &state,
                &repo,
                service,
                git_protocol(&headers),
                method == Method::HEAD,
            )
            .await
        }
        Endpoint::Rpc(service) => {
            if method != Method::POST {
                return Err(ApiError::MethodNotAllowed);
            }
            state.ensure_enabled(service)?;

            bridge::service_rpc(&state, service, &repo, &headers, body).await
        }
    }
}
