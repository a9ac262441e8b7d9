//! Prometheus Metrics Module
//!
//! Exposes service metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Prices**: Walk cycles per asset and failed store writes
//! - **Fan-out**: Events published, events replaced in full queues, dispatch latency
//! - **Subscribers**: Live count, opens, removals by reason, messages written
//! - **Admission**: Requests rejected by the rate governor
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder has already been installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

const PRICE_UPDATES: &str = "price_stream_price_updates_total";
const STORE_ERRORS: &str = "price_stream_store_errors_total";
const EVENTS_PUBLISHED: &str = "price_stream_events_published_total";
const EVENTS_REPLACED: &str = "price_stream_events_replaced_total";
const FANOUT_SECONDS: &str = "price_stream_fanout_seconds";
const SUBSCRIBERS: &str = "price_stream_subscribers";
const SUBSCRIBERS_OPENED: &str = "price_stream_subscribers_opened_total";
const SUBSCRIBERS_REMOVED: &str = "price_stream_subscribers_removed_total";
const MESSAGES_SENT: &str = "price_stream_messages_sent_total";
const REQUESTS_REJECTED: &str = "price_stream_requests_rejected_total";

fn register_metrics() {
    describe_counter!(PRICE_UPDATES, "Price walk cycles completed per asset");
    describe_counter!(STORE_ERRORS, "Failed writes to the price store per asset");

    describe_counter!(EVENTS_PUBLISHED, "Price changes fanned out by the hub");
    describe_counter!(
        EVENTS_REPLACED,
        "Queued events dropped because a subscriber queue was full"
    );
    describe_histogram!(FANOUT_SECONDS, "Time to fan one price change out to all subscribers");

    describe_gauge!(SUBSCRIBERS, "Live stream subscribers");
    describe_counter!(SUBSCRIBERS_OPENED, "Stream subscribers registered");
    describe_counter!(SUBSCRIBERS_REMOVED, "Stream subscribers retired by reason");
    describe_counter!(MESSAGES_SENT, "Price updates written to subscribers");

    describe_counter!(REQUESTS_REJECTED, "Requests denied by the rate governor per group");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one completed walk cycle.
pub fn record_price_update(asset: &str) {
    counter!(PRICE_UPDATES, "asset" => asset.to_string()).increment(1);
}

/// Record a failed write to the price store.
pub fn record_store_error(asset: &str) {
    counter!(STORE_ERRORS, "asset" => asset.to_string()).increment(1);
}

/// Record one price change fanned out.
pub fn record_event_published() {
    counter!(EVENTS_PUBLISHED).increment(1);
}

/// Record events dropped from full subscriber queues.
pub fn record_events_replaced(count: u64) {
    counter!(EVENTS_REPLACED).increment(count);
}

/// Record how long one fan-out pass took.
pub fn record_fanout_duration(duration: Duration) {
    histogram!(FANOUT_SECONDS).record(duration.as_secs_f64());
}

/// Update the live subscriber gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!(SUBSCRIBERS).set(count as f64);
}

/// Record a subscriber registration.
pub fn record_subscriber_opened() {
    counter!(SUBSCRIBERS_OPENED).increment(1);
}

/// Record a subscriber retirement.
pub fn record_subscriber_removed(reason: &'static str) {
    counter!(SUBSCRIBERS_REMOVED, "reason" => reason).increment(1);
}

/// Record a price update written to a subscriber.
pub fn record_message_sent() {
    counter!(MESSAGES_SENT).increment(1);
}

/// Record a request denied by the rate governor.
pub fn record_request_rejected(group: &'static str) {
    counter!(REQUESTS_REJECTED, "group" => group).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
