//! Metric name constants and recording helpers

use std::time::Instant;

use opentelemetry::metrics::Histogram;

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[opentelemetry::KeyValue]) {
    let duration = start.elapsed().as_secs_f64();
    histogram.record(duration, attributes);
}

/// Name of the meter every switchboard instrument is created from
pub const METER_NAME: &str = "switchboard";

// Relay metric names
pub const RELAY_REQUEST_DURATION: &str = "relay.request.duration";
pub const RELAY_REQUEST_COUNT: &str = "relay.request.count";
pub const CHANNEL_RETRY: &str = "relay.channel.retry";
pub const CHANNEL_DISABLED: &str = "relay.channel.disabled";
