//! Backward pagination.
//!
//! Older data is requested window by window. An empty window (or one whose
//! only entry sits on its end) doubles backward until data turns up or the
//! retention horizon is passed.

use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::Feed;
use crate::application::events::FeedEvent;
use crate::application::ports::{FeedError, Notification, UpdateMode, check_response};
use crate::domain::streaming::{Quote, TickHistoryRequest, first_epoch, format_history};
use crate::domain::subscription::{ChartParams, Granularity};
use crate::infrastructure::metrics::{self, RequestKind};

/// Result of a pagination request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationData {
    /// Older quotes, ascending by epoch.
    pub quotes: Vec<Quote>,
    /// `false` once the start of available data has been reached.
    pub more_available: bool,
    /// Set when the request failed.
    pub error: Option<FeedError>,
}

impl PaginationData {
    const fn exhausted() -> Self {
        Self {
            quotes: Vec::new(),
            more_available: false,
            error: None,
        }
    }

    const fn failed(error: FeedError) -> Self {
        Self {
            quotes: Vec::new(),
            more_available: true,
            error: Some(error),
        }
    }
}

impl Feed {
    /// Load data older than what the chart holds.
    ///
    /// Pagination of the main series emits
    /// [`PaginationStart`](FeedEvent::PaginationStart) before the request and
    /// [`PaginationProgress`](FeedEvent::PaginationProgress) once it settles,
    /// including when no request was made.
    pub async fn fetch_pagination_data(
        &self,
        symbol: &str,
        suggested_start: DateTime<Utc>,
        end: DateTime<Utc>,
        params: ChartParams,
    ) -> PaginationData {
        let start = suggested_start.timestamp();
        let end = end.timestamp();
        let is_main = self.is_primary(symbol);

        if is_main {
            self.events.emit(FeedEvent::PaginationStart { start, end });
        }

        let data = self.paginate(symbol, params.granularity(), start, end, is_main).await;

        if !data.quotes.is_empty() {
            let mode = UpdateMode::for_comparison((!is_main).then_some(symbol));
            self.chart.update_chart_data(&data.quotes, &mode);
            if is_main {
                self.chart.create_data_set();
            }
        }

        data
    }

    async fn paginate(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: i64,
        end: i64,
        is_main: bool,
    ) -> PaginationData {
        if self.range_window().violates(start, end) {
            if is_main {
                self.events.emit(FeedEvent::PaginationProgress { start, end });
                self.set_has_reached_end_of_data(true);
            }
            return PaginationData::exhausted();
        }

        let start_limit = self.clock.epoch() - self.options.retention_horizon_secs;
        if end <= start_limit {
            debug!(%symbol, end, start_limit, "Pagination past retention horizon");
            if is_main {
                self.events.emit(FeedEvent::PaginationProgress { start, end });
            }
            self.set_has_reached_end_of_data(true);
            return PaginationData::exhausted();
        }

        let mut start = start;
        let mut rounds = 0_u32;
        let (quotes, first, more_available) = loop {
            let request = TickHistoryRequest::new(symbol, granularity, start.max(start_limit)).with_end(end);
            metrics::record_history_request(RequestKind::Pagination);

            let response = match self.api.get_tick_history(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(%symbol, error = %e, "Pagination request failed");
                    self.pagination_loading.store(false, Ordering::SeqCst);
                    if is_main {
                        self.events.emit(FeedEvent::PaginationProgress { start, end });
                    }
                    return PaginationData::failed(e);
                }
            };

            let response = match check_response(response) {
                Ok(response) => response,
                Err(e) => {
                    self.pagination_loading.store(false, Ordering::SeqCst);
                    self.notify(Notification::active_symbol_error(e.to_string()));
                    return PaginationData::failed(e);
                }
            };

            let first = match first_epoch(&response) {
                Some(first) if first != end => first,
                _ => {
                    let new_start = start - (end - start).max(1);
                    rounds += 1;
                    if new_start <= start_limit || rounds >= self.options.max_pagination_rounds {
                        debug!(%symbol, start = new_start, rounds, "No older data available");
                        if is_main {
                            self.events.emit(FeedEvent::PaginationProgress { start, end });
                        }
                        self.set_has_reached_end_of_data(true);
                        return PaginationData::exhausted();
                    }
                    metrics::record_pagination_doubling();
                    start = new_start;
                    continue;
                }
            };

            let quotes = format_history(&response).unwrap_or_default();
            let more_available = first > start_limit;
            if !more_available {
                self.set_has_reached_end_of_data(true);
            }
            break (quotes, first, more_available);
        };

        if is_main {
            self.events.emit(FeedEvent::PaginationProgress {
                start,
                end: end.min(first),
            });
        }
        self.pagination_loading.store(false, Ordering::SeqCst);

        PaginationData {
            quotes,
            more_available,
            error: None,
        }
    }
}
