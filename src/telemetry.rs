use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
///
/// Log output goes to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError(err.to_string()))
}

/// Register descriptions for every metric the cache layer emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "atelier_query_hit_total",
            Unit::Count,
            "Total number of loads served from fresh cache entries."
        );
        describe_counter!(
            "atelier_query_miss_total",
            Unit::Count,
            "Total number of loads that needed a fetch."
        );
        describe_counter!(
            "atelier_query_dedup_total",
            Unit::Count,
            "Total number of loads that joined an in-flight fetch."
        );
        describe_counter!(
            "atelier_query_discarded_total",
            Unit::Count,
            "Total number of fetch results discarded because a newer request was issued."
        );
        describe_histogram!(
            "atelier_query_fetch_ms",
            Unit::Milliseconds,
            "Fetch latency in milliseconds."
        );
        describe_counter!(
            "atelier_cache_invalidated_total",
            Unit::Count,
            "Total number of cache entries marked stale by invalidation."
        );
        describe_counter!(
            "atelier_cache_evict_total",
            Unit::Count,
            "Total number of idle cache entries evicted due to capacity."
        );
        describe_counter!(
            "atelier_mutation_total",
            Unit::Count,
            "Total number of writes, labelled by outcome."
        );
        describe_histogram!(
            "atelier_mutation_ms",
            Unit::Milliseconds,
            "Write latency in milliseconds."
        );
        describe_counter!(
            "atelier_toggle_rejected_total",
            Unit::Count,
            "Total number of toggles rejected while a write was pending."
        );
    });
}
