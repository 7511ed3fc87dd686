//! Initial data loads.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Feed;
use crate::application::events::FeedEvent;
use crate::application::ports::{FeedError, Notification, UpdateMode, check_response};
use crate::application::services::subscription::{
    ChartDataHandler, DelayedSubscription, LiveSubscription, Subscription,
};
use crate::domain::streaming::{DataUpdate, Quote, TickHistoryRequest, format_history};
use crate::domain::subscription::{ChartParams, SubscriptionKey};
use crate::infrastructure::metrics::{self, RequestKind};

/// Result of an initial load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialData {
    /// Loaded quotes, ascending by epoch. Empty on failure.
    pub quotes: Vec<Quote>,
    /// Error code for the caller, when the load was refused.
    pub error: Option<String>,
    /// Whether the caller should skip its own error alert.
    pub suppress_alert: bool,
}

impl InitialData {
    fn loaded(quotes: Vec<Quote>) -> Self {
        Self {
            quotes,
            ..Self::default()
        }
    }

    fn streaming_not_allowed() -> Self {
        Self {
            quotes: Vec::new(),
            error: Some("StreamingNotAllowed".to_string()),
            suppress_alert: true,
        }
    }
}

impl Feed {
    /// Load the initial data of a symbol and, when its market is open, keep
    /// it streaming.
    ///
    /// The symbol is the main series when it equals the chart's primary
    /// symbol, otherwise a comparison. Loading a new main series cancels the
    /// previous in-flight main load and tears down every subscription.
    ///
    /// The request range comes from `suggested_start` and the range window;
    /// `suggested_end` is advisory and only logged.
    ///
    /// Quotes are written into the chart and returned.
    pub async fn fetch_initial_data(
        &self,
        symbol: &str,
        suggested_start: DateTime<Utc>,
        suggested_end: Option<DateTime<Utc>>,
        params: ChartParams,
    ) -> InitialData {
        self.set_has_reached_end_of_data(false);
        self.pagination_loading.store(true, Ordering::SeqCst);

        let result = self
            .load_initial(symbol, suggested_start, suggested_end, params)
            .await;

        self.pagination_loading.store(false, Ordering::SeqCst);
        result
    }

    async fn load_initial(
        &self,
        symbol: &str,
        suggested_start: DateTime<Utc>,
        suggested_end: Option<DateTime<Utc>>,
        params: ChartParams,
    ) -> InitialData {
        let granularity = params.granularity();
        let key = SubscriptionKey::new(symbol, granularity);
        let comparison = (!self.is_primary(symbol)).then(|| symbol.to_string());
        let symbol_name = self.trading_times.display_name(symbol);

        let window = self.range_window();
        let suggested_start = suggested_start.min(self.clock.now()).timestamp();
        let start = window.effective_start(suggested_start);
        let end = window.effective_end();
        debug!(%key, start, ?end, ?suggested_end, "Loading initial data");

        if comparison.is_none() {
            *self.granularity.lock() = granularity;
        }

        if self.trading_times.is_feed_unavailable(symbol) {
            info!(%symbol, "Streaming unavailable for symbol");
            self.notify(Notification::FeedUnavailable { symbol_name });
            if comparison.is_some() {
                return InitialData::streaming_not_allowed();
            }
            self.chart.set_availability(false);
            return InitialData::default();
        }

        let request = TickHistoryRequest::new(symbol, granularity, start);
        let mut started = None;
        let loaded = if let Some(end) = end {
            debug!(%key, start, end, "Loading pinned range");
            self.fetch_history(&request.with_end(end)).await
        } else if self.trading_times.is_market_opened(symbol) {
            self.start_subscription(request, &key, comparison.is_none(), symbol_name)
                .await
                .map(|(quotes, subscription)| {
                    started = Some(subscription);
                    Some(quotes)
                })
        } else {
            info!(%symbol, "Market closed, loading history only");
            self.notify(Notification::MarketClosed { symbol_name });
            self.fetch_history(&request).await
        };

        let quotes = match loaded {
            Ok(Some(quotes)) => quotes,
            Ok(None) => {
                error!(%key, "No quotes found in history response");
                return InitialData::default();
            }
            Err(FeedError::Cancelled) => {
                debug!(%key, "Initial load superseded");
                return InitialData::default();
            }
            Err(e) => {
                warn!(%key, error = %e, "Initial load failed");
                self.notify(Notification::active_symbol_error(e.to_string()));
                return InitialData::default();
            }
        };

        let quotes = window.trim_quotes(quotes);
        let mode = UpdateMode::for_comparison(comparison.as_deref());
        self.chart.update_chart_data(&quotes, &mode);
        if comparison.is_none() {
            self.chart.create_data_set();
        }

        self.scale_chart();
        self.emit_data_update(&quotes, comparison.as_deref(), true);

        // Held pushes must land after the initial data.
        if let Some(subscription) = started {
            self.register(key.clone(), Arc::clone(&subscription));
            subscription.on_chart_data(self.chart_data_handler(key.clone(), comparison));
        }

        info!(%key, quotes = quotes.len(), "Initial data loaded");
        InitialData::loaded(quotes)
    }

    /// One-shot history request.
    async fn fetch_history(
        &self,
        request: &TickHistoryRequest,
    ) -> Result<Option<Vec<Quote>>, FeedError> {
        metrics::record_history_request(RequestKind::Initial);
        let response = check_response(self.api.get_tick_history(request).await?)?;
        Ok(format_history(&response))
    }

    /// Create and start the subscription for `key`.
    ///
    /// The caller registers it once the returned quotes are in the chart.
    async fn start_subscription(
        &self,
        request: TickHistoryRequest,
        key: &SubscriptionKey,
        is_main: bool,
        symbol_name: String,
    ) -> Result<(Vec<Quote>, Arc<dyn Subscription>), FeedError> {
        let symbol = request.symbol.clone();
        let delay = self.trading_times.delay_minutes(&symbol);
        let options = &self.options.subscription;

        let subscription: Arc<dyn Subscription> = if delay > 0 {
            info!(%key, delay_minutes = delay, "Market data is delayed");
            self.notify(Notification::DelayedMarket {
                symbol_name,
                delay_minutes: delay,
            });
            Arc::new(DelayedSubscription::new(
                request,
                Arc::clone(&self.api),
                Arc::clone(&self.chart),
                delay,
                options.poll_interval,
            ))
        } else {
            Arc::new(LiveSubscription::new(
                request,
                Arc::clone(&self.api),
                Arc::clone(&self.chart),
                options.resubscribe.clone(),
            ))
        };

        let token = if is_main {
            let token = self.begin_primary_fetch();
            self.unsubscribe_all();
            token
        } else {
            self.lifetime.child_token()
        };

        let fetched = tokio::select! {
            biased;
            () = token.cancelled() => Err(FeedError::Cancelled),
            result = subscription.initial_fetch() => result,
        };

        let quotes = match fetched {
            Ok(quotes) => quotes,
            Err(e) => {
                subscription.forget();
                return Err(e);
            }
        };

        if token.is_cancelled() || (is_main && !self.is_primary(&symbol)) {
            subscription.forget();
            return Err(FeedError::Cancelled);
        }

        Ok((quotes, subscription))
    }

    /// Cancel the in-flight main load and hand out a token for the next one.
    fn begin_primary_fetch(&self) -> CancellationToken {
        let token = self.lifetime.child_token();
        if let Some(previous) = self.primary_fetch.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn chart_data_handler(
        &self,
        key: SubscriptionKey,
        comparison: Option<String>,
    ) -> ChartDataHandler {
        let feed = self.weak_self.clone();
        Arc::new(move |quotes: Vec<Quote>| {
            let Some(feed) = feed.upgrade() else {
                return;
            };
            if feed.chart.is_destroyed() {
                return;
            }
            if comparison.is_none() && !feed.is_primary(&key.symbol) {
                debug!(%key, "Dropping quotes for a replaced main series");
                return;
            }
            feed.append_chart_data(&quotes, &key, comparison.as_deref());
        })
    }

    /// Emit the data-update event for `quotes`.
    ///
    /// A reinitialized main series emits
    /// [`MasterDataReinitialize`](FeedEvent::MasterDataReinitialize) and
    /// marks the chart available again.
    pub(crate) fn emit_data_update(
        &self,
        quotes: &[Quote],
        comparison: Option<&str>,
        reinitialized: bool,
    ) {
        if comparison.is_none() && reinitialized {
            self.events.emit(FeedEvent::MasterDataReinitialize);
            self.chart.set_availability(true);
            return;
        }

        let Some(update) = DataUpdate::from_tail(quotes) else {
            return;
        };

        let event = match comparison {
            Some(symbol) => FeedEvent::ComparisonDataUpdate {
                symbol: symbol.to_string(),
                update,
            },
            None => FeedEvent::MasterDataUpdate(update),
        };
        self.events.emit(event);
    }
}
