use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber writing to stderr, keeping stdout
/// free for command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_histogram!(
            "glossa_batch_query_ms",
            Unit::Milliseconds,
            "Latency of a batched literal or type resolution in milliseconds."
        );
        describe_counter!(
            "glossa_batch_total",
            Unit::Count,
            "Total number of batched resolutions by mode and result."
        );
        describe_counter!(
            "glossa_cache_hit_total",
            Unit::Count,
            "Total number of per-store cache hits."
        );
        describe_counter!(
            "glossa_cache_miss_total",
            Unit::Count,
            "Total number of per-store cache misses."
        );
        describe_counter!(
            "glossa_cache_evict_total",
            Unit::Count,
            "Total number of per-store cache evictions due to capacity."
        );
        describe_counter!(
            "glossa_remote_call_failed_total",
            Unit::Count,
            "Total number of failed remote peer calls."
        );
        describe_gauge!(
            "glossa_invalidation_queue_len",
            Unit::Count,
            "Current number of pending invalidation events in the queue."
        );
        describe_counter!(
            "glossa_invalidation_dropped_total",
            Unit::Count,
            "Total number of invalidation events dropped due to queue overflow."
        );
        describe_histogram!(
            "glossa_invalidation_consume_ms",
            Unit::Milliseconds,
            "Invalidation consumption latency in milliseconds."
        );
    });
}
