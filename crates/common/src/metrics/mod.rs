//! Metrics and observability utilities
//!
//! Provides Prometheus metric descriptions and small recording helpers
//! with standardized naming conventions.

use metrics::{counter, describe_counter, Unit};

/// Metrics prefix for all Almanac metrics
pub const METRICS_PREFIX: &str = "almanac";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_digest_events_total", METRICS_PREFIX),
        Unit::Count,
        "Digest events processed, by outcome"
    );

    describe_counter!(
        format!("{}_catalog_lookups_total", METRICS_PREFIX),
        Unit::Count,
        "Catalog API lookups, by lookup kind and status"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Catalog cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Catalog cache misses"
    );

    describe_counter!(
        format!("{}_deliveries_total", METRICS_PREFIX),
        Unit::Count,
        "Transport deliveries, by channel and status"
    );

    tracing::info!("Metrics registered");
}

/// Record the terminal outcome of one digest event (sent, failed, skipped)
pub fn record_event_outcome(outcome: &str) {
    counter!(
        format!("{}_digest_events_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a catalog lookup result
pub fn record_catalog_lookup(lookup: &str, status: &str) {
    counter!(
        format!("{}_catalog_lookups_total", METRICS_PREFIX),
        "lookup" => lookup.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a cache access
pub fn record_cache(hit: bool, cache: &str) {
    let name = if hit {
        format!("{}_cache_hits_total", METRICS_PREFIX)
    } else {
        format!("{}_cache_misses_total", METRICS_PREFIX)
    };
    counter!(name, "cache" => cache.to_string()).increment(1);
}

/// Record a transport delivery attempt outcome
pub fn record_delivery(channel: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_deliveries_total", METRICS_PREFIX),
        "channel" => channel.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
