//! Feed
//!
//! Orchestrates everything between the remote API and the chart: initial
//! loads, backward pagination, the append path for streamed quotes, and
//! pause/resume around connection loss. Owns the active-subscription
//! registry; subscriptions never modify it themselves.
//!
//! Failures never escape the public operations: they are reported through
//! the notifier and resolve to empty data.

mod initial;
mod pagination;
mod stream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use initial::InitialData;
pub use pagination::PaginationData;

use super::subscription::{Subscription, SubscriptionOptions};
use crate::application::events::{DEFAULT_EVENT_CAPACITY, FeedEventHub};
use crate::application::ports::{ChartPort, Clock, MarketDataApi, Notification, NotifierPort, TradingTimesPort};
use crate::domain::subscription::{
    ChartParams, Granularity, SubscriptionKey, SubscriptionRegistry,
};
use crate::domain::window::RangeWindow;
use crate::infrastructure::metrics;

/// How far back the history API keeps data: `ceil(2.8 × 365 days)` in seconds.
pub const DEFAULT_RETENTION_HORIZON_SECS: i64 = 88_300_800;

/// Upper bound on window doublings in one pagination request.
pub const DEFAULT_MAX_PAGINATION_ROUNDS: u32 = 64;

/// External collaborators of a feed.
#[derive(Clone)]
pub struct FeedPorts {
    /// Remote market data API.
    pub api: Arc<dyn MarketDataApi>,
    /// Chart rendering engine.
    pub chart: Arc<dyn ChartPort>,
    /// User-facing notifications.
    pub notifier: Arc<dyn NotifierPort>,
    /// Market status lookups.
    pub trading_times: Arc<dyn TradingTimesPort>,
    /// Server time.
    pub clock: Arc<dyn Clock>,
}

/// Feed tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedOptions {
    /// Subscription tunables.
    pub subscription: SubscriptionOptions,
    /// Oldest data the history API serves, in seconds before now.
    pub retention_horizon_secs: i64,
    /// Upper bound on window doublings per pagination request.
    pub max_pagination_rounds: u32,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            subscription: SubscriptionOptions::default(),
            retention_horizon_secs: DEFAULT_RETENTION_HORIZON_SECS,
            max_pagination_rounds: DEFAULT_MAX_PAGINATION_ROUNDS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct ConnectionTracker {
    opened: bool,
    closed_at: Option<DateTime<Utc>>,
}

/// The market data feed of one chart.
pub struct Feed {
    weak_self: Weak<Self>,
    api: Arc<dyn MarketDataApi>,
    chart: Arc<dyn ChartPort>,
    notifier: Arc<dyn NotifierPort>,
    trading_times: Arc<dyn TradingTimesPort>,
    clock: Arc<dyn Clock>,
    options: FeedOptions,
    events: FeedEventHub,
    registry: SubscriptionRegistry<Arc<dyn Subscription>>,
    window: RwLock<RangeWindow>,
    granularity: Mutex<Granularity>,
    connection: Mutex<ConnectionTracker>,
    primary_fetch: Mutex<Option<CancellationToken>>,
    lifetime: CancellationToken,
    reached_end_of_data: AtomicBool,
    pagination_loading: AtomicBool,
}

impl Feed {
    /// Create a feed.
    #[must_use]
    pub fn new(ports: FeedPorts, options: FeedOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            api: ports.api,
            chart: ports.chart,
            notifier: ports.notifier,
            trading_times: ports.trading_times,
            clock: ports.clock,
            events: FeedEventHub::new(options.event_capacity),
            options,
            registry: SubscriptionRegistry::new(),
            window: RwLock::new(RangeWindow::UNBOUNDED),
            granularity: Mutex::new(Granularity::TICK),
            connection: Mutex::new(ConnectionTracker {
                opened: true,
                closed_at: None,
            }),
            primary_fetch: Mutex::new(None),
            lifetime: CancellationToken::new(),
            reached_end_of_data: AtomicBool::new(false),
            pagination_loading: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Event channel of this feed.
    #[must_use]
    pub const fn events(&self) -> &FeedEventHub {
        &self.events
    }

    /// Current range window.
    #[must_use]
    pub fn range_window(&self) -> RangeWindow {
        *self.window.read()
    }

    /// Pin (or unpin) the range window.
    pub fn set_range_window(&self, window: RangeWindow) {
        debug!(?window, "Range window changed");
        *self.window.write() = window;
    }

    /// Granularity of the last primary load.
    #[must_use]
    pub fn granularity(&self) -> Granularity {
        *self.granularity.lock()
    }

    /// Whether pagination has hit the start of available data.
    #[must_use]
    pub fn has_reached_end_of_data(&self) -> bool {
        self.reached_end_of_data.load(Ordering::SeqCst)
    }

    /// Whether a load or pagination request is in flight.
    #[must_use]
    pub fn is_pagination_loading(&self) -> bool {
        self.pagination_loading.load(Ordering::SeqCst)
    }

    /// Whether the connection is currently considered open.
    #[must_use]
    pub fn is_connection_opened(&self) -> bool {
        self.connection.lock().opened
    }

    /// Keys of all active subscriptions.
    #[must_use]
    pub fn active_keys(&self) -> Vec<SubscriptionKey> {
        self.registry.keys()
    }

    /// The active subscription for a key.
    #[must_use]
    pub fn subscription(&self, key: &SubscriptionKey) -> Option<Arc<dyn Subscription>> {
        self.registry.get(key)
    }

    fn set_has_reached_end_of_data(&self, reached: bool) {
        self.pagination_loading.store(false, Ordering::SeqCst);
        self.reached_end_of_data.store(reached, Ordering::SeqCst);
    }

    fn is_primary(&self, symbol: &str) -> bool {
        self.chart.primary_symbol().as_deref() == Some(symbol)
    }

    fn notify(&self, notification: Notification) {
        metrics::record_notification(notification.name());
        self.notifier.notify(notification);
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Register a subscription, forgetting any it replaces.
    fn register(&self, key: SubscriptionKey, subscription: Arc<dyn Subscription>) {
        if let Some(previous) = self.registry.insert(key.clone(), Arc::clone(&subscription))
            && !Arc::ptr_eq(&previous, &subscription)
        {
            debug!(%key, "Replacing subscription");
            previous.forget();
        }
        metrics::set_active_subscriptions(self.registry.len());
    }

    fn forget_stream(&self, key: &SubscriptionKey) {
        if let Some(subscription) = self.registry.remove(key) {
            subscription.forget();
            metrics::set_active_subscriptions(self.registry.len());
        }
    }

    /// Tear down the subscription for a symbol.
    ///
    /// No-op for the primary symbol: its subscription follows symbol changes
    /// made through [`fetch_initial_data`](Self::fetch_initial_data).
    pub fn unsubscribe(&self, symbol: &str, params: ChartParams) {
        if self.is_primary(symbol) {
            return;
        }
        let key = SubscriptionKey::new(symbol, params.granularity());
        debug!(%key, "Unsubscribing");
        self.forget_stream(&key);
    }

    /// Tear down every subscription.
    pub fn unsubscribe_all(&self) {
        let drained = self.registry.drain();
        for (key, subscription) in &drained {
            debug!(%key, "Forgetting subscription");
            subscription.forget();
        }
        metrics::set_active_subscriptions(0);
    }

    /// Stop all background work and forget every subscription.
    pub fn shutdown(&self) {
        info!(subscriptions = self.registry.len(), "Shutting down feed");
        self.lifetime.cancel();
        if let Some(token) = self.primary_fetch.lock().take() {
            token.cancel();
        }
        self.unsubscribe_all();
    }

    // =========================================================================
    // Chart Range
    // =========================================================================

    /// Apply the range window to the chart.
    pub fn on_range_changed(&self) {
        let window = self.range_window();
        let range = window.visible_range(self.granularity(), self.chart.max_ticks());
        self.chart.set_range(range);

        if window.is_pinned() {
            self.scale_chart();
        } else {
            self.chart.home();
        }
    }

    /// Fit the chart to its data when a start is pinned.
    pub fn scale_chart(&self) {
        if self.range_window().start_epoch.is_none() {
            return;
        }

        let len = self.chart.data_set_len();
        let padding = match len / 5 {
            0 => 2,
            n => n,
        };
        self.chart.set_max_ticks(len + padding);
        self.chart.scroll_to(len);
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("subscriptions", &self.registry.len())
            .field("window", &self.range_window())
            .field("connection_opened", &self.is_connection_opened())
            .finish_non_exhaustive()
    }
}
