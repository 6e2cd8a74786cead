use std::sync::OnceLock;
use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};
use switchboard_channel::ChannelSlot;
use switchboard_telemetry::metrics::{
    CHANNEL_RETRY, METER_NAME, RELAY_REQUEST_COUNT, RELAY_REQUEST_DURATION, record_duration,
};

use crate::ProtocolKind;

fn retry_counter() -> &'static Counter<u64> {
    static COUNTER: OnceLock<Counter<u64>> = OnceLock::new();
    COUNTER.get_or_init(|| {
        opentelemetry::global::meter(METER_NAME)
            .u64_counter(CHANNEL_RETRY)
            .with_description("Relay attempts that moved on to another channel")
            .build()
    })
}

fn request_counter() -> &'static Counter<u64> {
    static COUNTER: OnceLock<Counter<u64>> = OnceLock::new();
    COUNTER.get_or_init(|| {
        opentelemetry::global::meter(METER_NAME)
            .u64_counter(RELAY_REQUEST_COUNT)
            .with_description("Relayed requests by outcome")
            .build()
    })
}

fn request_duration() -> &'static Histogram<f64> {
    static HISTOGRAM: OnceLock<Histogram<f64>> = OnceLock::new();
    HISTOGRAM.get_or_init(|| {
        opentelemetry::global::meter(METER_NAME)
            .f64_histogram(RELAY_REQUEST_DURATION)
            .with_unit("s")
            .with_description("Time spent in the retry loop, all attempts included")
            .build()
    })
}

pub fn record_retry(channel: &ChannelSlot, reason: &str) {
    retry_counter().add(
        1,
        &[
            KeyValue::new("channel_id", i64::from(channel.id().get())),
            KeyValue::new("channel_name", channel.name().to_owned()),
            KeyValue::new("reason", reason.to_owned()),
        ],
    );
}

pub fn record_request(protocol: ProtocolKind, outcome: &'static str, started: Instant) {
    let attributes = [
        KeyValue::new("protocol", protocol.to_string()),
        KeyValue::new("outcome", outcome),
    ];

    request_counter().add(1, &attributes);
    record_duration(request_duration(), started, &attributes);
}
