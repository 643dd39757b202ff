//! Logging, request tracing and Prometheus metrics.
//!
//! Every request runs inside a `request` span tagged with its id. Engine
//! stderr and exit events are logged from inside that span, so a single
//! clone or push can be followed through the log by `request_id`.

mod logging;
mod metrics;
mod middleware;

pub use logging::{default_directive, init_logging, LogFormat};
pub use metrics::{Metrics, Outcome, Route, METRICS};
pub use middleware::{metrics_handler, trace_request, track_metrics, RequestId, REQUEST_ID_HEADER};
