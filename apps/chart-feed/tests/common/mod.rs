//! Shared fixtures for feed integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chart_feed::application::ports::{
    FeedError, LiveStream, MarketDataApi, Notification, NotifierPort,
};
use chart_feed::domain::streaming::{
    Candle, History, Numeric, StreamMessage, Tick, TickHistoryRequest, TickHistoryResponse,
};
use chart_feed::infrastructure::chart::InMemoryChart;
use chart_feed::infrastructure::clock::ManualClock;
use chart_feed::infrastructure::trading_times::StaticTradingTimes;
use chart_feed::{Feed, FeedOptions, FeedPorts};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

pub const NOW: i64 = 1_700_000_000;

/// Market data API serving a fixed server-side series.
///
/// History requests answer with every epoch of the series inside the
/// requested range; subscriptions answer the same way and keep a push
/// channel open.
#[derive(Default)]
pub struct FakeApi {
    series: Mutex<Vec<i64>>,
    error_body: Mutex<Option<(String, String)>>,
    failures: Mutex<VecDeque<FeedError>>,
    history_requests: Mutex<Vec<TickHistoryRequest>>,
    subscribe_requests: Mutex<Vec<TickHistoryRequest>>,
    pushes: Mutex<Vec<mpsc::Sender<StreamMessage>>>,
    forgotten: Mutex<Vec<String>>,
    gates: Mutex<VecDeque<Arc<Notify>>>,
    next_stream: AtomicU64,
}

impl FakeApi {
    pub fn with_series(epochs: impl IntoIterator<Item = i64>) -> Arc<Self> {
        let api = Self::default();
        *api.series.lock() = epochs.into_iter().collect();
        Arc::new(api)
    }

    /// Answer every request with an error body.
    pub fn reject_with(&self, code: &str, message: &str) {
        *self.error_body.lock() = Some((code.to_string(), message.to_string()));
    }

    /// Fail the next history request at the transport level.
    pub fn fail_next(&self, error: FeedError) {
        self.failures.lock().push_back(error);
    }

    /// Hold the next subscribe call until the returned gate is notified.
    pub fn gate_next_subscribe(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().push_back(Arc::clone(&gate));
        gate
    }

    /// Extend the server-side series.
    pub fn extend(&self, epochs: impl IntoIterator<Item = i64>) {
        self.series.lock().extend(epochs);
    }

    /// Push a tick on the most recent stream.
    pub async fn push_tick(&self, epoch: i64) {
        let sender = self.pushes.lock().last().cloned();
        if let Some(sender) = sender {
            let _ = sender.send(tick_push(epoch)).await;
        }
    }

    pub fn history_requests(&self) -> Vec<TickHistoryRequest> {
        self.history_requests.lock().clone()
    }

    pub fn subscribe_requests(&self) -> Vec<TickHistoryRequest> {
        self.subscribe_requests.lock().clone()
    }

    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().clone()
    }

    fn respond(&self, request: &TickHistoryRequest) -> TickHistoryResponse {
        if let Some((code, message)) = self.error_body.lock().clone() {
            return TickHistoryResponse::from_error(code, message);
        }

        let end = request.end.unwrap_or(i64::MAX);
        let epochs: Vec<i64> = self
            .series
            .lock()
            .iter()
            .copied()
            .filter(|e| (request.start..=end).contains(e))
            .collect();

        if request.granularity.is_tick() {
            TickHistoryResponse::from_history(History {
                times: epochs.iter().copied().map(Numeric::from).collect(),
                prices: epochs.iter().copied().map(Numeric::from).collect(),
            })
        } else {
            TickHistoryResponse::from_candles(
                epochs
                    .iter()
                    .map(|e| Candle {
                        epoch: Numeric::from(*e),
                        open: Numeric::from(*e),
                        high: Numeric::from(*e),
                        low: Numeric::from(*e),
                        close: Numeric::from(*e),
                    })
                    .collect(),
            )
        }
    }
}

#[async_trait]
impl MarketDataApi for FakeApi {
    async fn get_tick_history(
        &self,
        request: &TickHistoryRequest,
    ) -> Result<TickHistoryResponse, FeedError> {
        self.history_requests.lock().push(request.clone());
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.respond(request))
    }

    async fn subscribe(&self, request: &TickHistoryRequest) -> Result<LiveStream, FeedError> {
        self.subscribe_requests.lock().push(request.clone());
        let gate = self.gates.lock().pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let history = self.respond(request);
        if let Some(error) = history.error {
            return Err(FeedError::Api {
                code: error.code,
                message: error.message,
            });
        }

        let (tx, updates) = mpsc::channel(64);
        self.pushes.lock().push(tx);
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);

        Ok(LiveStream {
            history,
            stream_id: Some(format!("stream-{id}")),
            updates,
        })
    }

    async fn forget(&self, stream_id: &str) -> Result<(), FeedError> {
        self.forgotten.lock().push(stream_id.to_string());
        Ok(())
    }
}

/// Notifier keeping every notification.
#[derive(Default)]
pub struct Notifications(Mutex<Vec<Notification>>);

impl Notifications {
    pub fn all(&self) -> Vec<Notification> {
        self.0.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.lock().iter().map(Notification::name).collect()
    }
}

impl NotifierPort for Notifications {
    fn notify(&self, notification: Notification) {
        self.0.lock().push(notification);
    }
}

pub fn tick_push(epoch: i64) -> StreamMessage {
    StreamMessage {
        tick: Some(Tick {
            epoch: Numeric::from(epoch),
            quote: Numeric::from(epoch),
            symbol: None,
            id: None,
        }),
        ohlc: None,
    }
}

pub struct Harness {
    pub feed: Arc<Feed>,
    pub api: Arc<FakeApi>,
    pub chart: Arc<InMemoryChart>,
    pub clock: Arc<ManualClock>,
    pub notifications: Arc<Notifications>,
}

impl Harness {
    pub fn new(api: Arc<FakeApi>, trading_times: StaticTradingTimes) -> Self {
        Self::with_options(api, trading_times, FeedOptions::default())
    }

    pub fn with_options(
        api: Arc<FakeApi>,
        trading_times: StaticTradingTimes,
        options: FeedOptions,
    ) -> Self {
        let chart = Arc::new(InMemoryChart::new("R_50"));
        let clock = Arc::new(ManualClock::at_epoch(NOW));
        let notifications = Arc::new(Notifications::default());
        let feed = Feed::new(
            FeedPorts {
                api: api.clone(),
                chart: chart.clone(),
                notifier: notifications.clone(),
                trading_times: Arc::new(trading_times),
                clock: clock.clone(),
            },
            options,
        );

        Self {
            feed,
            api,
            chart,
            clock,
            notifications,
        }
    }
}

/// Poll `condition` until it holds, failing after one second.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached");
}

pub fn at(epoch: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(epoch, 0).unwrap_or_default()
}
