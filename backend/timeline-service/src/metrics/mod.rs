//! Timeline Service Metrics
//!
//! Prometheus counters for fan-out, the day-bucket cache, background cleanup
//! and the Kafka consumer.

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

static FANOUT_EMISSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_fanout_emissions_total",
        "Follower timeline events emitted during fan-out (published/failed)",
        &["outcome"]
    )
    .expect("Failed to register fan-out emissions metric")
});

static CACHE_READS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_cache_reads_total",
        "Timeline reads served from the day-bucket cache (hit/miss)",
        &["read", "outcome"]
    )
    .expect("Failed to register cache reads metric")
});

static STALE_DISCARDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "timeline_stale_snapshots_discarded_total",
        "Incoming post snapshots dropped by last-writer-wins"
    )
    .expect("Failed to register stale discards metric")
});

static WRITE_CONFLICTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_bucket_write_conflicts_total",
        "Optimistic day-bucket write conflicts (retried/exhausted)",
        &["result"]
    )
    .expect("Failed to register write conflicts metric")
});

static CLEANUP_JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_cleanup_jobs_total",
        "Background cache cleanup jobs (success/error/dropped)",
        &["outcome"]
    )
    .expect("Failed to register cleanup jobs metric")
});

static CONSUMER_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_consumer_messages_total",
        "Kafka messages handled by topic and disposition",
        &["topic", "disposition"]
    )
    .expect("Failed to register consumer messages metric")
});

static OPERATION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "timeline_operation_duration_seconds",
        "Duration of timeline operations",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("Failed to register operation duration metric")
});

pub fn record_fanout_emission(outcome: &str, count: u64) {
    FANOUT_EMISSIONS_TOTAL
        .with_label_values(&[outcome])
        .inc_by(count);
}

/// `read` is `range` or `all`; `outcome` is `hit` or `miss`
pub fn record_cache_read(read: &str, outcome: &str) {
    CACHE_READS_TOTAL.with_label_values(&[read, outcome]).inc();
}

pub fn record_stale_discard() {
    STALE_DISCARDS_TOTAL.inc();
}

pub fn record_write_conflict(result: &str) {
    WRITE_CONFLICTS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_cleanup_job(outcome: &str) {
    CLEANUP_JOBS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_consumer_message(topic: &str, disposition: &str) {
    CONSUMER_MESSAGES_TOTAL
        .with_label_values(&[topic, disposition])
        .inc();
}

pub fn record_operation_duration(operation: &str, duration: Duration) {
    OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Prometheus text exposition for `GET /metrics`
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
