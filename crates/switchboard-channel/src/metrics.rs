use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use switchboard_telemetry::metrics::{CHANNEL_DISABLED, METER_NAME};

use crate::{ChannelId, Trigger};

fn disabled_counter() -> &'static Counter<u64> {
    static COUNTER: OnceLock<Counter<u64>> = OnceLock::new();
    COUNTER.get_or_init(|| {
        opentelemetry::global::meter(METER_NAME)
            .u64_counter(CHANNEL_DISABLED)
            .with_description("Channels taken out of rotation")
            .build()
    })
}

pub fn record_disabled(id: ChannelId, trigger: Trigger) {
    disabled_counter().add(
        1,
        &[
            KeyValue::new("channel_id", i64::from(id.get())),
            KeyValue::new("source", trigger.to_string()),
        ],
    );
}
