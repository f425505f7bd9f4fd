use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, TextEncoder,
};

static STREAM_STARTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("stream_starts_total", "Total number of stream starts"),
        &["stream_key"],
    )
    .expect("failed to create stream_starts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register stream_starts_total");
    counter
});

static STREAM_STOPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("stream_stops_total", "Total number of stream stops"),
        &["stream_key"],
    )
    .expect("failed to create stream_stops_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register stream_stops_total");
    counter
});

static CONCURRENT_VIEWERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new("concurrent_viewers", "Number of concurrent viewers"),
        &["stream_key"],
    )
    .expect("failed to create concurrent_viewers");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register concurrent_viewers");
    gauge
});

static WEBHOOK_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new("webhook_duration_seconds", "Webhook processing duration").buckets(
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
        ),
        &["webhook_type"],
    )
    .expect("failed to create webhook_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register webhook_duration_seconds");
    histogram
});

static RECONCILE_CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "reconcile_cycles_total",
            "Snapshot reconciliation cycles by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create reconcile_cycles_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register reconcile_cycles_total");
    counter
});

static TRANSITION_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "transition_failures_total",
            "Transitions whose store batch was rejected, by kind",
        ),
        &["kind"],
    )
    .expect("failed to create transition_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register transition_failures_total");
    counter
});

pub fn record_stream_start(stream_key: &str) {
    STREAM_STARTS_TOTAL.with_label_values(&[stream_key]).inc();
}

pub fn record_stream_stop(stream_key: &str) {
    STREAM_STOPS_TOTAL.with_label_values(&[stream_key]).inc();
    CONCURRENT_VIEWERS.with_label_values(&[stream_key]).set(0);
}

pub fn set_concurrent_viewers(stream_key: &str, count: u64) {
    CONCURRENT_VIEWERS
        .with_label_values(&[stream_key])
        .set(count as i64);
}

pub fn observe_webhook(webhook_type: &str, elapsed: Duration) {
    WEBHOOK_DURATION_SECONDS
        .with_label_values(&[webhook_type])
        .observe(elapsed.as_secs_f64());
}

pub fn record_reconcile_cycle(outcome: &str) {
    RECONCILE_CYCLES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_transition_failure(kind: &str) {
    TRANSITION_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
