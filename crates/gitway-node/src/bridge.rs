//! Pack-protocol bridge between an HTTP exchange and one engine process.
//!
//! The request body is collected in full (bounded by `max_body_bytes`) and
//! fed to the engine's stdin from a separate task. The engine's stdout
//! becomes the response body as it is produced. The body only ends once
//! the process has exited, and dropping it (client disconnect) drops the
//! process handle, which kills the process.

use crate::error::ApiError;
use crate::observability::{Outcome, METRICS};
use crate::repository::ResolvedRepo;
use crate::router::AppState;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use flate2::read::GzDecoder;
use futures::{future, stream, StreamExt, TryStreamExt};
use gitway_git::{EngineExit, EngineProcess, EngineRequest, EngineWriter, GitError, Service};
use std::io::Read;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn, Instrument, Span};

/// Header carrying protocol negotiation hints (`version=2`).
pub const GIT_PROTOCOL_HEADER: HeaderName = HeaderName::from_static("git-protocol");

const MAX_GIT_PROTOCOL_LEN: usize = 256;

/// Handles `POST /<repo>/git-upload-pack` and `POST /<repo>/git-receive-pack`.
pub async fn service_rpc(
    state: &AppState,
    service: Service,
    repo: &ResolvedRepo,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let request_body = read_request_body(body, headers, state.config.max_body_bytes).await?;

    let request =
        EngineRequest::new(service, &repo.path).with_git_protocol(git_protocol(headers));
    let mut process = state.engine.stateless_rpc(&request).await?;
    let exchange = Exchange::start(service, &repo.name);

    info!(
        service = %service,
        repo = %repo.name,
        request_bytes = request_body.len(),
        "Running stateless RPC"
    );

    match process.stdin.take() {
        Some(stdin) => {
            tokio::spawn(
                feed_stdin(stdin, request_body, service, repo.name.clone()).in_current_span(),
            );
        }
        None => warn!(service = %service, repo = %repo.name, "Engine has no stdin; request body dropped"),
    }

    Ok(exchange_response(
        service.result_content_type(),
        stream_exchange(None, process, exchange),
    ))
}

/// Writes the request to the engine and closes its stdin.
///
/// The engine produces nothing until stdin is closed.
async fn feed_stdin(mut stdin: EngineWriter, body: Bytes, service: Service, repo: String) {
    if let Err(e) = stdin.write_all(&body).await {
        // The engine may exit early (e.g. after an ERR line) or be killed on disconnect.
        debug!(service = %service, repo = %repo, error = %e, "Engine stopped reading request");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        debug!(service = %service, repo = %repo, error = %e, "Failed to close engine stdin");
    }
}

/// Tracks one engine process from spawn until exit or abort.
///
/// Holds the request span so events logged after the handler returned,
/// while the body streams, still carry the request id.
pub(crate) struct Exchange {
    service: Service,
    repo: String,
    started: Instant,
    span: Span,
    finished: bool,
}

impl Exchange {
    pub(crate) fn start(service: Service, repo: &str) -> Self {
        METRICS.engines_running.inc();
        Self {
            service,
            repo: repo.to_string(),
            started: Instant::now(),
            span: Span::current(),
            finished: false,
        }
    }

    fn finish(&mut self, exit: Result<EngineExit, GitError>) {
        self.finished = true;
        let _entered = self.span.enter();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;

        let outcome = match exit {
            Ok(exit) if exit.success() => {
                info!(
                    service = %self.service,
                    repo = %self.repo,
                    exit_code = ?exit.code,
                    elapsed_ms,
                    "Engine process exited"
                );
                Outcome::Success
            }
            Ok(exit) => {
                // Git already reported the failure in-band; the HTTP status stays 200.
                warn!(
                    service = %self.service,
                    repo = %self.repo,
                    exit_code = ?exit.code,
                    elapsed_ms,
                    "Engine process exited with failure"
                );
                Outcome::Failure
            }
            Err(e) => {
                warn!(service = %self.service, repo = %self.repo, error = %e, "Failed to wait for engine process");
                Outcome::Failure
            }
        };

        self.record(outcome);
    }

    fn record(&self, outcome: Outcome) {
        METRICS.record_exchange(
            self.service.service_name(),
            outcome,
            self.started.elapsed().as_secs_f64(),
        );
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.finished {
            let _entered = self.span.enter();
            warn!(
                service = %self.service,
                repo = %self.repo,
                "Response dropped before engine exit; terminating engine process"
            );
            self.record(Outcome::Aborted);
        }
        METRICS.engines_running.dec();
    }
}

/// Builds the response body: optional preamble, engine stdout, then the
/// wait for the engine to exit.
pub(crate) fn stream_exchange(
    preamble: Option<Bytes>,
    process: EngineProcess,
    mut exchange: Exchange,
) -> Body {
    let EngineProcess { stdout, exit, .. } = process;
    let (service, repo, span) = (exchange.service, exchange.repo.clone(), exchange.span.clone());

    let head = stream::iter(preamble.map(Ok::<_, std::io::Error>));
    let output = ReaderStream::new(stdout).inspect_err(move |e| {
        let _entered = span.enter();
        warn!(service = %service, repo = %repo, error = %e, "Error reading engine output");
    });
    let tail = stream::once(async move {
        exchange.finish(exit.await);
        None::<std::io::Result<Bytes>>
    })
    .filter_map(future::ready);

    Body::from_stream(head.chain(output).chain(tail))
}

/// Wraps a streaming body with the content type and no-cache headers.
pub(crate) fn exchange_response(content_type: &'static str, body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache, max-age=0, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "Fri, 01 Jan 1980 00:00:00 GMT"),
        ],
        body,
    )
        .into_response()
}

/// Value of the `Git-Protocol` header, if it is safe to export.
pub(crate) fn git_protocol(headers: &HeaderMap) -> Option<String> {
    headers
        .get(GIT_PROTOCOL_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.len() <= MAX_GIT_PROTOCOL_LEN && v.bytes().all(|b| b.is_ascii_graphic()))
        .map(String::from)
}

#[derive(Debug, PartialEq, Eq)]
enum ContentEncoding {
    Identity,
    Gzip,
    Unsupported(String),
}

fn content_encoding(headers: &HeaderMap) -> ContentEncoding {
    match headers
        .get(header::CONTENT_ENCODING)
        .map(|v| v.to_str().unwrap_or("").trim().to_ascii_lowercase())
    {
        None => ContentEncoding::Identity,
        Some(enc) if enc.is_empty() || enc == "identity" => ContentEncoding::Identity,
        Some(enc) if enc == "gzip" || enc == "x-gzip" => ContentEncoding::Gzip,
        Some(enc) => ContentEncoding::Unsupported(enc),
    }
}

/// Collects the request body, decoding gzip, never holding more than `limit` bytes.
pub(crate) async fn read_request_body(
    body: Body,
    headers: &HeaderMap,
    limit: usize,
) -> Result<Bytes, ApiError> {
    let encoding = content_encoding(headers);
    if let ContentEncoding::Unsupported(enc) = encoding {
        return Err(ApiError::InvalidBody(format!(
            "unsupported content encoding: {enc}"
        )));
    }

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(ApiError::PayloadTooLarge);
    }

    let mut buf = BytesMut::new();
    let mut chunks = body.into_data_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| ApiError::InvalidBody(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    let raw = buf.freeze();

    match encoding {
        ContentEncoding::Gzip => tokio::task::spawn_blocking(move || gunzip(&raw, limit))
            .await
            .map_err(|e| ApiError::InvalidBody(e.to_string()))?,
        _ => Ok(raw),
    }
}

fn gunzip(data: &[u8], limit: usize) -> Result<Bytes, ApiError> {
    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|e| ApiError::InvalidBody(format!("gzip: {e}")))?;

    if decoded.len() > limit {
        return Err(ApiError::PayloadTooLarge);
    }
    Ok(Bytes::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[tokio::test]
    async fn test_read_plain_body() {
        let body = read_request_body(Body::from("0009done\n0000"), &HeaderMap::new(), 1024)
            .await
            .unwrap();
        assert_eq!(&body[..], b"0009done\n0000");
    }

    #[tokio::test]
    async fn test_read_gzip_body() {
        let payload = b"0032want 0123456789012345678901234567890123456789\n0000".repeat(20);
        let body = read_request_body(
            Body::from(gzip(&payload)),
            &headers(&[("content-encoding", "gzip")]),
            payload.len(),
        )
        .await
        .unwrap();
        assert_eq!(&body[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_body_over_limit() {
        let result = read_request_body(Body::from(vec![b'x'; 65]), &HeaderMap::new(), 64).await;
        assert!(matches!(result, Err(ApiError::PayloadTooLarge)));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let result = read_request_body(
            Body::empty(),
            &headers(&[("content-length", "4096")]),
            64,
        )
        .await;
        assert!(matches!(result, Err(ApiError::PayloadTooLarge)));
    }

    #[tokio::test]
    async fn test_gzip_bomb_bounded() {
        let payload = vec![0u8; 1024 * 1024];
        let result = read_request_body(
            Body::from(gzip(&payload)),
            &headers(&[("content-encoding", "gzip")]),
            4096,
        )
        .await;
        assert!(matches!(result, Err(ApiError::PayloadTooLarge)));
    }

    #[tokio::test]
    async fn test_invalid_gzip() {
        let result = read_request_body(
            Body::from("definitely not gzip"),
            &headers(&[("content-encoding", "gzip")]),
            1024,
        )
        .await;
        assert!(matches!(result, Err(ApiError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_unsupported_encoding() {
        let result = read_request_body(
            Body::from("abc"),
            &headers(&[("content-encoding", "br")]),
            1024,
        )
        .await;
        assert!(matches!(result, Err(ApiError::InvalidBody(_))));
    }

    #[test]
    fn test_git_protocol_header() {
        assert_eq!(
            git_protocol(&headers(&[("git-protocol", "version=2")])),
            Some("version=2".to_string())
        );
        assert_eq!(git_protocol(&headers(&[("git-protocol", "a b")])), None);
        assert_eq!(git_protocol(&HeaderMap::new()), None);
    }

    #[test]
    fn test_content_encoding() {
        assert_eq!(content_encoding(&HeaderMap::new()), ContentEncoding::Identity);
        assert_eq!(
            content_encoding(&headers(&[("content-encoding", "x-gzip")])),
            ContentEncoding::Gzip
        );
        assert_eq!(
            content_encoding(&headers(&[("content-encoding", "Identity")])),
            ContentEncoding::Identity
        );
    }
}
