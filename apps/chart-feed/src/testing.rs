//! Test doubles shared by unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::application::ports::{FeedError, LiveStream, MarketDataApi, Notification, NotifierPort};
use crate::domain::streaming::{
    Candle, History, Numeric, Ohlc, StreamMessage, Tick, TickHistoryRequest, TickHistoryResponse,
};

type Responder = Box<dyn Fn(&TickHistoryRequest) -> TickHistoryResponse + Send + Sync>;
type ScriptedStream = Result<(TickHistoryResponse, String, mpsc::Receiver<StreamMessage>), FeedError>;

/// Market data API answering from scripted queues.
#[derive(Default)]
pub struct ScriptedApi {
    history: Mutex<VecDeque<Result<TickHistoryResponse, FeedError>>>,
    responder: Mutex<Option<Responder>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    history_requests: Mutex<Vec<TickHistoryRequest>>,
    subscribe_requests: Mutex<Vec<TickHistoryRequest>>,
    forgotten: Mutex<Vec<String>>,
    forgotten_signal: Notify,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a history response.
    pub fn push_history(&self, response: TickHistoryResponse) {
        self.history.lock().push_back(Ok(response));
    }

    /// Answer history requests with `f` once the queue is empty.
    pub fn respond_with<F>(&self, f: F)
    where
        F: Fn(&TickHistoryRequest) -> TickHistoryResponse + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Box::new(f));
    }

    /// Queue a subscription; returns the sender feeding its pushes.
    pub fn push_subscription(
        &self,
        history: TickHistoryResponse,
        stream_id: &str,
    ) -> mpsc::Sender<StreamMessage> {
        let (tx, rx) = mpsc::channel(16);
        self.streams
            .lock()
            .push_back(Ok((history, stream_id.to_string(), rx)));
        tx
    }

    /// Queue a subscription failure.
    pub fn fail_subscribe(&self, error: FeedError) {
        self.streams.lock().push_back(Err(error));
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

    /// Wait until `stream_id` has been released.
    pub async fn wait_forgotten(&self, stream_id: &str) {
        loop {
            let notified = self.forgotten_signal.notified();
            if self.forgotten.lock().iter().any(|id| id == stream_id) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl MarketDataApi for ScriptedApi {
    async fn get_tick_history(
        &self,
        request: &TickHistoryRequest,
    ) -> Result<TickHistoryResponse, FeedError> {
        self.history_requests.lock().push(request.clone());
        if let Some(next) = self.history.lock().pop_front() {
            return next;
        }
        self.responder
            .lock()
            .as_ref()
            .map(|f| f(request))
            .ok_or(FeedError::ChannelClosed)
    }

    async fn subscribe(&self, request: &TickHistoryRequest) -> Result<LiveStream, FeedError> {
        self.subscribe_requests.lock().push(request.clone());
        let next = self.streams.lock().pop_front();
        let (history, stream_id, updates) = next.unwrap_or(Err(FeedError::ChannelClosed))?;
        Ok(LiveStream {
            history,
            stream_id: Some(stream_id),
            updates,
        })
    }

    async fn forget(&self, stream_id: &str) -> Result<(), FeedError> {
        self.forgotten.lock().push(stream_id.to_string());
        self.forgotten_signal.notify_waiters();
        Ok(())
    }
}

/// Notifier keeping every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }
}

impl NotifierPort for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}

/// Tick history whose prices equal the epochs.
pub fn tick_history(epochs: &[i64]) -> TickHistoryResponse {
    TickHistoryResponse::from_history(History {
        times: epochs.iter().copied().map(Numeric::from).collect(),
        prices: epochs.iter().copied().map(Numeric::from).collect(),
    })
}

/// Candle history with flat bars.
pub fn candle_history(epochs: &[i64]) -> TickHistoryResponse {
    TickHistoryResponse::from_candles(
        epochs
            .iter()
            .map(|e| Candle {
                epoch: Numeric::from(*e),
                open: Numeric::from("1"),
                high: Numeric::from("2"),
                low: Numeric::from("0.5"),
                close: Numeric::from("1.5"),
            })
            .collect(),
    )
}

/// A pushed tick.
pub fn tick_push(epoch: i64, price: &str) -> StreamMessage {
    StreamMessage {
        tick: Some(Tick {
            epoch: Numeric::from(epoch),
            quote: Numeric::from(price),
            symbol: None,
            id: None,
        }),
        ohlc: None,
    }
}

/// A pushed OHLC update.
pub fn ohlc_push(open_time: i64, close: &str) -> StreamMessage {
    StreamMessage {
        tick: None,
        ohlc: Some(Ohlc {
            open_time: Numeric::from(open_time),
            open: Numeric::from("1"),
            high: Numeric::from("2"),
            low: Numeric::from("0.5"),
            close: Numeric::from(close),
            epoch: None,
            granularity: None,
            symbol: None,
            id: None,
        }),
    }
}
