//! Subscriptions
//!
//! Per-key streaming state. A subscription performs the first history request
//! for its range, then keeps delivering new quotes until it is paused or
//! forgotten:
//!
//! - [`LiveSubscription`] holds an upstream push stream
//! - [`DelayedSubscription`] polls history on an interval, offset by the
//!   feed's publication delay
//!
//! Subscriptions never touch the registry; the feed owns them.

mod delayed;
mod live;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

pub use delayed::DelayedSubscription;
pub use live::LiveSubscription;

use super::reconnect::ReconnectConfig;
use crate::application::ports::{ChartPort, FeedError, MarketDataApi, check_response};
use crate::domain::streaming::{Quote, TickHistoryRequest, TickHistoryResponse, format_history};
use crate::domain::subscription::{SubscriptionKey, SubscriptionState};

/// Callback receiving newly arrived quotes.
pub type ChartDataHandler = Arc<dyn Fn(Vec<Quote>) + Send + Sync>;

/// Default delayed-feed poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3_000);

/// Tunables shared by all subscriptions of a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionOptions {
    /// Poll interval of delayed subscriptions.
    pub poll_interval: Duration,
    /// Backoff used when a live subscription resubscribes.
    pub resubscribe: ReconnectConfig,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            resubscribe: ReconnectConfig::default(),
        }
    }
}

/// A unit of streaming state for one `(symbol, granularity)` key.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Registry key.
    fn key(&self) -> SubscriptionKey;

    /// Current lifecycle state.
    fn state(&self) -> SubscriptionState;

    /// Epoch of the newest quote seen.
    fn last_stream_epoch(&self) -> Option<i64>;

    /// Fetch the configured range and start streaming.
    async fn initial_fetch(&self) -> Result<Vec<Quote>, FeedError>;

    /// Register the callback for new quotes, replacing any previous one.
    fn on_chart_data(&self, handler: ChartDataHandler);

    /// Stop streaming until [`resume`](Self::resume).
    fn pause(&self);

    /// Restart streaming from the last epoch and return the gap quotes.
    async fn resume(&self) -> Result<Vec<Quote>, FeedError>;

    /// Tear down. Idempotent and infallible.
    fn forget(&self);
}

// =============================================================================
// Shared State
// =============================================================================

/// State common to both subscription variants.
pub(crate) struct SubscriptionCore {
    pub(crate) request: TickHistoryRequest,
    pub(crate) api: Arc<dyn MarketDataApi>,
    chart: Arc<dyn ChartPort>,
    lifetime: CancellationToken,
    state: Mutex<SubscriptionState>,
    last_epoch: Mutex<Option<i64>>,
    sink: Mutex<Sink>,
    delivery: Mutex<()>,
}

/// Handler slot plus quotes pushed before a handler was attached.
#[derive(Default)]
struct Sink {
    handler: Option<ChartDataHandler>,
    pending: Vec<Quote>,
}

impl SubscriptionCore {
    pub(crate) fn new(
        request: TickHistoryRequest,
        api: Arc<dyn MarketDataApi>,
        chart: Arc<dyn ChartPort>,
    ) -> Self {
        Self {
            request,
            api,
            chart,
            lifetime: CancellationToken::new(),
            state: Mutex::new(SubscriptionState::Created),
            last_epoch: Mutex::new(None),
            sink: Mutex::new(Sink::default()),
            delivery: Mutex::new(()),
        }
    }

    pub(crate) fn key(&self) -> SubscriptionKey {
        self.request.key()
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }

    /// Move to `next` unless already forgotten.
    pub(crate) fn transition(&self, next: SubscriptionState) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    pub(crate) fn is_forgotten(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    pub(crate) const fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    pub(crate) fn last_epoch(&self) -> Option<i64> {
        *self.last_epoch.lock()
    }

    fn advance(&self, quotes: &[Quote]) {
        if let Some(last) = quotes.last() {
            let mut epoch = self.last_epoch.lock();
            *epoch = Some(epoch.map_or(last.epoch, |e| e.max(last.epoch)));
        }
    }

    /// Attach the handler and flush quotes held back until now.
    pub(crate) fn set_handler(&self, handler: ChartDataHandler) {
        let _delivery = self.delivery.lock();
        let pending = {
            let mut sink = self.sink.lock();
            sink.handler = Some(Arc::clone(&handler));
            std::mem::take(&mut sink.pending)
        };

        if !pending.is_empty() && !self.is_forgotten() && !self.chart.is_destroyed() {
            tracing::debug!(key = %self.key(), quotes = pending.len(), "Flushing held quotes");
            handler(pending);
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.sink.lock().pending.len()
    }

    /// Format a history response and advance the last epoch.
    pub(crate) fn process_history(
        &self,
        response: TickHistoryResponse,
    ) -> Result<Vec<Quote>, FeedError> {
        let response = check_response(response)?;
        let quotes = format_history(&response).unwrap_or_default();
        self.advance(&quotes);
        Ok(quotes)
    }

    /// Hand new quotes to the registered handler.
    ///
    /// Quotes arriving before a handler is attached are held and flushed by
    /// [`set_handler`](Self::set_handler). No-op once forgotten or after the
    /// chart was destroyed.
    pub(crate) fn deliver(&self, quotes: Vec<Quote>) {
        if quotes.is_empty() || self.is_forgotten() || self.chart.is_destroyed() {
            return;
        }

        let _delivery = self.delivery.lock();
        self.advance(&quotes);
        let handler = {
            let mut sink = self.sink.lock();
            let Some(handler) = sink.handler.clone() else {
                sink.pending.extend(quotes);
                return;
            };
            handler
        };

        handler(quotes);
    }

    /// Mark forgotten and cancel every background task.
    pub(crate) fn forget(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = SubscriptionState::Forgotten;
        }
        self.lifetime.cancel();
        *self.sink.lock() = Sink::default();
        tracing::debug!(key = %self.key(), "Subscription forgotten");
        true
    }
}
