//! Pagination Integration Tests
//!
//! Walks a chart backward through a series with gaps until the retention
//! horizon.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chart_feed::application::events::FeedEvent;
use chart_feed::application::ports::FeedError;
use chart_feed::infrastructure::trading_times::StaticTradingTimes;
use chart_feed::{ChartInterval, ChartParams, FeedOptions};
use tokio_test::assert_ok;

use common::{FakeApi, Harness, NOW, at};

const HORIZON: i64 = 10_000;

fn minutes() -> ChartParams {
    ChartParams::new(1, ChartInterval::Minute)
}

fn series() -> Vec<i64> {
    (NOW - 9_000..=NOW - 3_000)
        .step_by(60)
        .chain((NOW - 600..=NOW).step_by(60))
        .collect()
}

fn harness() -> Harness {
    Harness::with_options(
        FakeApi::with_series(series()),
        StaticTradingTimes::new(),
        FeedOptions {
            retention_horizon_secs: HORIZON,
            ..FeedOptions::default()
        },
    )
}

#[tokio::test]
async fn walks_back_across_gaps_to_the_horizon() {
    let h = harness();
    let initial = h
        .feed
        .fetch_initial_data("R_50", at(NOW - 600), None, minutes())
        .await;
    assert_eq!(initial.quotes.len(), 11);

    let mut events = h.feed.events().subscribe();

    // The gap before the initial window is bridged by doubling twice.
    let page = h
        .feed
        .fetch_pagination_data("R_50", at(NOW - 1_200), at(NOW - 600), minutes())
        .await;
    assert!(page.error.is_none());
    assert!(page.more_available);
    assert_eq!(page.quotes.first().unwrap().epoch, NOW - 3_000);
    let starts: Vec<i64> = h.api.history_requests()[1..].iter().map(|r| r.start).collect();
    assert_eq!(starts, vec![NOW - 1_200, NOW - 1_800, NOW - 3_000]);
    assert_eq!(
        assert_ok!(events.try_recv()),
        FeedEvent::PaginationStart {
            start: NOW - 1_200,
            end: NOW - 600
        }
    );
    assert_eq!(
        assert_ok!(events.try_recv()),
        FeedEvent::PaginationProgress {
            start: NOW - 3_000,
            end: NOW - 3_000
        }
    );

    // Requests never reach past the horizon.
    let page = h
        .feed
        .fetch_pagination_data("R_50", at(NOW - 12_000), at(NOW - 3_000), minutes())
        .await;
    assert_eq!(h.api.history_requests().last().unwrap().start, NOW - HORIZON);
    assert_eq!(page.quotes.len(), 101);
    assert!(page.more_available);
    assert!(!h.feed.has_reached_end_of_data());

    // Nothing older than the first bar: doubling crosses the horizon.
    let page = h
        .feed
        .fetch_pagination_data("R_50", at(NOW - 20_000), at(NOW - 9_000), minutes())
        .await;
    assert!(page.quotes.is_empty());
    assert!(!page.more_available);
    assert!(h.feed.has_reached_end_of_data());

    assert_eq!(h.chart.bars().len(), 112);
    assert_eq!(h.chart.bars().first().unwrap().epoch, NOW - 9_000);
}

#[tokio::test]
async fn window_past_horizon_is_not_requested() {
    let h = harness();

    let page = h
        .feed
        .fetch_pagination_data("R_50", at(NOW - 30_000), at(NOW - 20_000), minutes())
        .await;

    assert!(!page.more_available);
    assert!(h.api.history_requests().is_empty());
    assert!(h.feed.has_reached_end_of_data());
}

#[tokio::test]
async fn transport_failure_reports_progress_without_notifying() {
    let h = harness();
    h.api.fail_next(FeedError::connection("reset by peer"));
    let mut events = h.feed.events().subscribe();

    let page = h
        .feed
        .fetch_pagination_data("R_50", at(NOW - 1_200), at(NOW - 600), minutes())
        .await;

    assert!(page.more_available);
    assert!(page.error.unwrap().is_transient());
    assert!(h.notifications.all().is_empty());
    assert!(!h.feed.is_pagination_loading());
    let _start = assert_ok!(events.try_recv());
    assert!(matches!(
        assert_ok!(events.try_recv()),
        FeedEvent::PaginationProgress { .. }
    ));
}

#[tokio::test]
async fn error_body_notifies() {
    let h = harness();
    h.api.reject_with("RateLimit", "You have reached the rate limit");

    let page = h
        .feed
        .fetch_pagination_data("R_50", at(NOW - 1_200), at(NOW - 600), minutes())
        .await;

    assert!(page.error.is_some());
    assert_eq!(h.notifications.names(), vec!["message"]);
}

#[tokio::test]
async fn comparison_pages_into_secondary_series() {
    let h = harness();
    let mut events = h.feed.events().subscribe();

    let page = h
        .feed
        .fetch_pagination_data("R_100", at(NOW - 3_600), at(NOW - 3_000), minutes())
        .await;

    assert_eq!(page.quotes.len(), 11);
    assert_eq!(h.chart.secondary_series("R_100").len(), 11);
    assert!(h.chart.bars().is_empty());
    assert!(events.try_recv().is_err());
}
