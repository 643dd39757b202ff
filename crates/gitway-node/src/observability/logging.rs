//! Log subscriber setup for the binary.

use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Shape of the log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// One JSON object per event, fields flattened to the top level.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`, expected pretty or json")),
        }
    }
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(level: &str) -> String {
    format!("gitway_git={level},gitway_node={level},tower_http=debug,axum::rejection=trace")
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
///
/// Panics if a global subscriber is already installed.
///
/// ```rust,no_run
/// use gitway_node::observability::{init_logging, LogFormat};
///
/// init_logging("debug", LogFormat::Json);
/// ```
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init(),
        LogFormat::Pretty => subscriber.with(fmt::layer().pretty().with_thread_ids(false)).init(),
    }

    tracing::debug!(level, ?format, "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" JSON ".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_default_directive_is_valid() {
        let directive = default_directive("warn");
        assert!(directive.starts_with("gitway_git=warn,gitway_node=warn"));
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
