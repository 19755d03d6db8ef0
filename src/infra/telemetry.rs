use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const COUNTERS: &[(&str, &str)] = &[
    (
        "lexquery_cache_hit_total",
        "Queries answered from the cache without a transport call.",
    ),
    ("lexquery_cache_miss_total", "Queries that started a fetch."),
    (
        "lexquery_inflight_join_total",
        "Queries that joined a fetch already in flight.",
    ),
    (
        "lexquery_fetch_discarded_total",
        "Fetch results dropped because a newer fetch was already applied.",
    ),
    (
        "lexquery_cache_evict_total",
        "Cache entries removed, after their grace period or explicitly.",
    ),
    (
        "lexquery_invalidation_refetch_total",
        "Subscribed entries refetched after a mutation.",
    ),
];

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; stdout is reserved for command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer(logging.format))
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Register descriptions for every metric the cache emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for &(name, description) in COUNTERS {
            describe_counter!(name, Unit::Count, description);
        }
        describe_gauge!(
            "lexquery_cache_entries",
            Unit::Count,
            "Current number of cache entries."
        );
        describe_histogram!(
            "lexquery_fetch_ms",
            Unit::Milliseconds,
            "Transport plus decode latency per fetch."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn second_init_reports_telemetry_error() {
        let logging = LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        };

        // Another test may already have installed a subscriber.
        let _ = init(&logging);
        let err = init(&logging).expect_err("global subscriber already set");
        assert!(matches!(err, InfraError::Telemetry(_)));
    }
}
