//! Prometheus metrics for the live pipeline.
//!
//! The recorder is installed once at startup; recording before that is a
//! no-op, so library code and tests can call the helpers freely.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("office_events_total", "Domain events applied, by type.kind label");
    describe_counter!("office_lines_dropped_total", "Log lines that produced no events");
    describe_counter!("office_tail_errors_total", "Non-fatal tailer I/O errors");
    describe_counter!("office_snapshots_sent_total", "Snapshots broadcast to subscribers");
    describe_counter!(
        "office_snapshots_coalesced_total",
        "Snapshot requests folded into a pending send"
    );
    describe_counter!(
        "office_subscribers_rejected_total",
        "Subscribers rejected at admission, by reason"
    );
    describe_counter!("office_ingress_rate_limited_total", "Push requests rejected by the rate limiter");
    describe_gauge!("office_live_sessions", "Sessions currently tracked by the registry");
    describe_gauge!("office_subscribers", "Currently connected subscribers");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_event(label: &'static str) {
    counter!("office_events_total", "event" => label).increment(1);
}

pub fn record_line_dropped() {
    counter!("office_lines_dropped_total").increment(1);
}

pub fn record_tail_error() {
    counter!("office_tail_errors_total").increment(1);
}

pub fn record_snapshot_sent() {
    counter!("office_snapshots_sent_total").increment(1);
}

pub fn record_snapshot_coalesced() {
    counter!("office_snapshots_coalesced_total").increment(1);
}

/// `reason` is `"global"` or `"per_ip"`.
pub fn record_subscriber_rejected(reason: &'static str) {
    counter!("office_subscribers_rejected_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited() {
    counter!("office_ingress_rate_limited_total").increment(1);
}

pub fn set_live_sessions(count: usize) {
    gauge!("office_live_sessions").set(count as f64);
}

pub fn set_subscribers(count: usize) {
    gauge!("office_subscribers").set(count as f64);
}
