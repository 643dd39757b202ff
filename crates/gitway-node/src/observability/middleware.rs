//! Per-request tracing and metrics middleware.

use super::metrics::{Route, METRICS};
use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus_client::metrics::gauge::Gauge;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the request id, accepted from clients and always echoed.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id recorded on the `request` span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuses a client-supplied id when it is short and printable,
    /// otherwise generates a fresh one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self(id)
    }
}

/// Runs the request inside a `request` span and logs its start and status.
pub async fn trace_request(request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id.0,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        tracing::info!(
            method = %request.method(),
            path = %request.uri().path(),
            "Incoming request"
        );

        let started = Instant::now();
        let mut response = next.run(request).await;

        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response started"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id.0) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Holds one unit of an in-flight gauge until dropped.
///
/// The request future may be dropped at any await (client disconnect while
/// a push body is still arriving), so the decrement cannot sit after
/// `next.run`.
pub(crate) struct InFlight(Gauge);

impl InFlight {
    pub(crate) fn enter(gauge: &Gauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Counts requests by route and status.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = Route::from_path(request.uri().path());
    let started = Instant::now();

    let in_flight = InFlight::enter(&METRICS.requests_in_flight);
    let response = next.run(request).await;
    drop(in_flight);

    METRICS.record_request(
        method.as_str(),
        route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> Response {
    match METRICS.encode() {
        Ok(text) => (
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_flight_released_when_future_dropped() {
        let gauge = Gauge::default();

        let stalled = {
            let gauge = gauge.clone();
            async move {
                let _in_flight = InFlight::enter(&gauge);
                std::future::pending::<()>().await;
            }
        };
        let mut stalled = Box::pin(stalled);
        assert!(futures::poll!(stalled.as_mut()).is_pending());
        assert_eq!(gauge.get(), 1);

        drop(stalled);
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_request_id_reused_from_client() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(RequestId::from_headers(&headers).0, "abc-123");
    }

    #[test]
    fn test_request_id_generated_when_unusable() {
        let generated = RequestId::from_headers(&HeaderMap::new());
        assert!(Uuid::parse_str(&generated.0).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(
            REQUEST_ID_HEADER,
            HeaderValue::from_str(&"x".repeat(MAX_REQUEST_ID_LEN + 1)).unwrap(),
        );
        assert_ne!(RequestId::from_headers(&headers).0.len(), MAX_REQUEST_ID_LEN + 1);
    }
}
