use opentelemetry::{KeyValue, metrics::UpDownCounter};
use std::sync::LazyLock;

static STATDS: LazyLock<UpDownCounter<i64>> = LazyLock::new(|| {
    logfire::i64_up_down_counter("wa_translate_statds")
        .with_description("WhatsApp translation webhook statistics")
        .with_unit("delivery")
        .build()
});

fn incr_statds(metric: &'static str, value: &'static str) {
    STATDS.add(1, &[KeyValue::new(metric, value)]);
}

pub fn incr_pipeline_outcome_statds(outcome: &'static str) {
    incr_statds("pipeline_outcome", outcome)
}

pub fn incr_signature_statds(verdict: &'static str) {
    incr_statds("signature", verdict)
}

pub fn incr_authorization_statds(verdict: &'static str) {
    incr_statds("authorization", verdict)
}
