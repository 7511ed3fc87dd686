//! Prometheus Metrics Module
//!
//! Exposes feed metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Requests**: History requests by purpose, pagination window doublings
//! - **Streams**: Pushed messages, resubscribe attempts, active subscriptions
//! - **Connection**: WebSocket state, errors, reconnects and request latency
//! - **Notifications**: User-facing notifications by type
//!
//! # Integration
//!
//! Metrics are served at `/metrics` on the configured metrics port. Without
//! [`init_metrics`] every recording function is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::streaming::HistoryStyle;

// =============================================================================
// Installation
// =============================================================================

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be bound.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()?;

    register_metrics();
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Request counters
    describe_counter!(
        "chart_feed_history_requests_total",
        "Total history requests sent, by purpose"
    );
    describe_counter!(
        "chart_feed_pagination_doublings_total",
        "Total pagination windows doubled backward after an empty response"
    );

    // Stream counters and gauges
    describe_counter!(
        "chart_feed_stream_messages_total",
        "Total push messages received on live streams"
    );
    describe_counter!(
        "chart_feed_resubscribe_attempts_total",
        "Total live stream resubscribe attempts"
    );
    describe_gauge!(
        "chart_feed_active_subscriptions",
        "Number of registered subscriptions"
    );

    // Connection
    describe_gauge!(
        "chart_feed_websocket_connected",
        "Whether the WebSocket connection is up (1) or down (0)"
    );
    describe_counter!(
        "chart_feed_connection_changes_total",
        "Total connection state changes seen by the feed"
    );
    describe_counter!(
        "chart_feed_websocket_errors_total",
        "Total WebSocket errors by type"
    );
    describe_counter!(
        "chart_feed_reconnects_total",
        "Total WebSocket reconnection attempts"
    );
    describe_histogram!(
        "chart_feed_request_duration_seconds",
        "Round-trip time of API requests"
    );

    // Notifications
    describe_counter!(
        "chart_feed_notifications_total",
        "Total user-facing notifications by type"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for history request purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// One-shot load of a closed market or pinned range.
    Initial,
    /// Live subscription opening.
    Subscribe,
    /// Delayed subscription initial load.
    Delayed,
    /// Delayed subscription poll.
    Poll,
    /// Delayed subscription gap fetch after a pause.
    Resume,
    /// Backward pagination window.
    Pagination,
}

impl RequestKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Subscribe => "subscribe",
            Self::Delayed => "delayed",
            Self::Poll => "poll",
            Self::Resume => "resume",
            Self::Pagination => "pagination",
        }
    }
}

/// Record a history request.
pub fn record_history_request(kind: RequestKind) {
    counter!(
        "chart_feed_history_requests_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a pagination window doubling.
pub fn record_pagination_doubling() {
    counter!("chart_feed_pagination_doublings_total").increment(1);
}

/// Record a push message on a live stream.
pub fn record_stream_message(style: HistoryStyle) {
    counter!(
        "chart_feed_stream_messages_total",
        "style" => style.as_str()
    )
    .increment(1);
}

/// Record a resubscribe attempt.
pub fn record_resubscribe_attempt() {
    counter!("chart_feed_resubscribe_attempts_total").increment(1);
}

/// Update the registered subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("chart_feed_active_subscriptions").set(count as f64);
}

/// Record a connection state change seen by the feed.
pub fn record_connection_change(opened: bool) {
    counter!(
        "chart_feed_connection_changes_total",
        "state" => if opened { "opened" } else { "closed" }
    )
    .increment(1);
}

/// Update the WebSocket connection gauge.
pub fn set_websocket_connected(connected: bool) {
    gauge!("chart_feed_websocket_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a WebSocket error.
pub fn record_websocket_error(error_type: &str) {
    counter!(
        "chart_feed_websocket_errors_total",
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a WebSocket reconnection attempt.
pub fn record_reconnect() {
    counter!("chart_feed_reconnects_total").increment(1);
}

/// Record an API request round trip.
pub fn record_request_duration(msg_type: &'static str, duration: Duration) {
    histogram!(
        "chart_feed_request_duration_seconds",
        "msg_type" => msg_type
    )
    .record(duration.as_secs_f64());
}

/// Record a user-facing notification.
pub fn record_notification(name: &'static str) {
    counter!(
        "chart_feed_notifications_total",
        "notification" => name
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_kind_as_str() {
        assert_eq!(RequestKind::Initial.as_str(), "initial");
        assert_eq!(RequestKind::Subscribe.as_str(), "subscribe");
        assert_eq!(RequestKind::Delayed.as_str(), "delayed");
        assert_eq!(RequestKind::Poll.as_str(), "poll");
        assert_eq!(RequestKind::Resume.as_str(), "resume");
        assert_eq!(RequestKind::Pagination.as_str(), "pagination");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_history_request(RequestKind::Poll);
        record_stream_message(HistoryStyle::Candles);
        set_active_subscriptions(3);
        record_request_duration("ticks_history", Duration::from_millis(5));
    }
}
