//! Prometheus metrics.
//!
//! Request metrics stop when the response headers are produced. A git
//! response keeps streaming long after that, so each engine exchange is
//! measured separately, up to the exit of its process.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Endpoint a request was addressed to, with the repository left out.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Route {
    InfoRefs,
    UploadPack,
    ReceivePack,
    Other,
}

impl Route {
    /// Classifies a request path of the form `/<repo>/<endpoint>`.
    pub fn from_path(path: &str) -> Self {
        let endpoint = path
            .trim_start_matches('/')
            .split_once('/')
            .map(|(_, rest)| rest)
            .unwrap_or("");

        match endpoint {
            "info/refs" => Self::InfoRefs,
            "git-upload-pack" => Self::UploadPack,
            "git-receive-pack" => Self::ReceivePack,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InfoRefs => "info_refs",
            Self::UploadPack => "git_upload_pack",
            Self::ReceivePack => "git_receive_pack",
            Self::Other => "other",
        }
    }
}

impl EncodeLabelValue for Route {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        EncodeLabelValue::encode(&self.as_str(), encoder)
    }
}

/// How an engine exchange ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
    /// The process exited with status zero.
    Success,
    /// Nonzero exit, or the exit status could not be collected.
    Failure,
    /// The response was dropped while the process was still running.
    Aborted,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Aborted => "aborted",
        }
    }
}

impl EncodeLabelValue for Outcome {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        EncodeLabelValue::encode(&self.as_str(), encoder)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    pub route: Route,
    pub status: u16,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExchangeLabels {
    /// Wire name, e.g. `git-upload-pack`.
    pub service: String,
    pub outcome: Outcome,
}

/// Process-wide metrics, registered on first use.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

pub struct Metrics {
    registry: RwLock<Registry>,
    /// Requests answered, by method, route and status.
    pub requests: Family<RequestLabels, Counter>,
    /// Time until the response headers were ready.
    pub request_latency: Family<RequestLabels, Histogram>,
    /// Requests whose headers have not been produced yet.
    pub requests_in_flight: Gauge,
    /// Engine processes owned by a live exchange.
    pub engines_running: Gauge,
    /// Finished exchanges, by service and outcome.
    pub exchanges: Family<ExchangeLabels, Counter>,
    /// Engine process lifetime.
    pub exchange_duration: Family<ExchangeLabels, Histogram>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        let request_latency = Family::<RequestLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.0005, 2.0, 14))
        });
        let requests_in_flight = Gauge::default();
        let engines_running = Gauge::default();
        let exchanges = Family::<ExchangeLabels, Counter>::default();
        // Clones and pushes can run for minutes.
        let exchange_duration = Family::<ExchangeLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.01, 2.0, 18))
        });

        let mut registry = Registry::with_prefix("gitway");
        registry.register("http_requests", "HTTP requests answered", requests.clone());
        registry.register(
            "http_request_latency_seconds",
            "Time until response headers were ready",
            request_latency.clone(),
        );
        registry.register(
            "http_requests_in_flight",
            "Requests awaiting response headers",
            requests_in_flight.clone(),
        );
        registry.register(
            "engines_running",
            "Engine processes currently running",
            engines_running.clone(),
        );
        registry.register(
            "exchanges",
            "Engine exchanges finished, by outcome",
            exchanges.clone(),
        );
        registry.register(
            "exchange_duration_seconds",
            "Engine process lifetime",
            exchange_duration.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            requests,
            request_latency,
            requests_in_flight,
            engines_running,
            exchanges,
            exchange_duration,
        }
    }

    pub fn record_request(&self, method: &str, route: Route, status: u16, seconds: f64) {
        let labels = RequestLabels {
            method: method.to_string(),
            route,
            status,
        };
        self.requests.get_or_create(&labels).inc();
        self.request_latency.get_or_create(&labels).observe(seconds);
    }

    pub fn record_exchange(&self, service: &str, outcome: Outcome, seconds: f64) {
        let labels = ExchangeLabels {
            service: service.to_string(),
            outcome,
        };
        self.exchanges.get_or_create(&labels).inc();
        self.exchange_duration.get_or_create(&labels).observe(seconds);
    }

    /// Renders the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        prometheus_client::encoding::text::encode(&mut out, &self.registry.read())?;
        Ok(out)
    }
}
