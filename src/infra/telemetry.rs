use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, fmt,
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const CACHE_COUNTERS: [(&str, &str); 5] = [
    ("bookshelf_cache_hit_total", "Cached list responses served without running a producer."),
    ("bookshelf_cache_miss_total", "Cache misses that started a producer run."),
    (
        "bookshelf_cache_producer_failure_total",
        "Producer runs that failed or exceeded the producer timeout.",
    ),
    (
        "bookshelf_cache_stale_discard_total",
        "Computed payloads dropped because one of their tags was invalidated mid-flight.",
    ),
    (
        "bookshelf_cache_invalidated_total",
        "Entries removed by invalidation, labelled by tag (`*` for a full clear).",
    ),
];

/// Install the global subscriber. `RUST_LOG` refines `logging.level`.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(format_layer(logging.format))
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    }
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, description) in CACHE_COUNTERS {
            describe_counter!(name, Unit::Count, description);
        }
        describe_gauge!(
            "bookshelf_cache_entries",
            Unit::Count,
            "List responses currently held by the cache."
        );
    });
}
