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

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

/// Register metric descriptions with the installed recorder. Runs once per process.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "storefront_offline_cache_hit_total",
            Unit::Count,
            "Intercepted requests answered from a cache partition."
        );
        describe_counter!(
            "storefront_offline_cache_miss_total",
            Unit::Count,
            "Cache-first lookups that found no stored copy."
        );
        describe_counter!(
            "storefront_offline_cache_write_total",
            Unit::Count,
            "Response copies written to the dynamic partition."
        );
        describe_counter!(
            "storefront_offline_network_failure_total",
            Unit::Count,
            "Intercepted requests whose network fetch failed."
        );
        describe_counter!(
            "storefront_offline_fallback_total",
            Unit::Count,
            "Network failures answered with a cached copy."
        );
        describe_counter!(
            "storefront_offline_sync_total",
            Unit::Count,
            "Background sync runs by outcome."
        );
        describe_histogram!(
            "storefront_offline_install_ms",
            Unit::Milliseconds,
            "Duration of app-shell precaching at install."
        );
        describe_gauge!(
            "storefront_offline_background_events",
            Unit::Count,
            "Fetch events with cache writes still in flight."
        );
    });
}
