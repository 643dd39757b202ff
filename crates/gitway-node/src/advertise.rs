//! Reference advertisement for `GET /<repo>/info/refs?service=...`.

use crate::bridge::{exchange_response, stream_exchange, Exchange};
use crate::error::ApiError;
use crate::repository::ResolvedRepo;
use crate::router::AppState;
use axum::{body::Body, response::Response};
use bytes::Bytes;
use gitway_git::{EngineRequest, Service};
use tracing::info;

/// Parses the `service` query parameter; absent or empty is an error.
pub fn parse_service(service: Option<&str>) -> Result<Service, ApiError> {
    match service {
        None | Some("") => Err(ApiError::MissingService),
        Some(name) => Ok(Service::parse(name)?),
    }
}

/// Streams the `# service=` preamble followed by the engine's advertisement.
///
/// `head_only` answers a HEAD request with the headers alone, without
/// starting a process.
pub async fn info_refs(
    state: &AppState,
    repo: &ResolvedRepo,
    service: Service,
    git_protocol: Option<String>,
    head_only: bool,
) -> Result<Response, ApiError> {
    let preamble = Bytes::from(service.preamble()?);
    let content_type = service.advertisement_content_type();

    if head_only {
        return Ok(exchange_response(content_type, Body::empty()));
    }

    let request = EngineRequest::new(service, &repo.path).with_git_protocol(git_protocol);
    let process = state.engine.advertise(&request).await?;
    let exchange = Exchange::start(service, &repo.name);

    info!(service = %service, repo = %repo.name, "Advertising refs");

    Ok(exchange_response(
        content_type,
        stream_exchange(Some(preamble), process, exchange),
    ))
}
