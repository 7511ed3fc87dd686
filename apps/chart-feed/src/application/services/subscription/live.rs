//! Live Subscription
//!
//! Holds an upstream push stream. The subscribe call returns a history
//! snapshot for the requested range; afterwards a reader task turns each
//! pushed tick or OHLC update into a quote.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ChartDataHandler, Subscription, SubscriptionCore};
use crate::application::ports::{ChartPort, FeedError, LiveStream, MarketDataApi};
use crate::application::services::reconnect::{ReconnectConfig, ReconnectPolicy, retry_with_backoff};
use crate::domain::streaming::{Quote, StreamMessage, TickHistoryRequest, format_tick};
use crate::domain::subscription::{SubscriptionKey, SubscriptionState};
use crate::domain::window::splice_after;
use crate::infrastructure::metrics::{self, RequestKind};

/// Push-based subscription.
pub struct LiveSubscription {
    core: Arc<SubscriptionCore>,
    resubscribe: ReconnectConfig,
    reader: Mutex<Option<CancellationToken>>,
}

impl LiveSubscription {
    /// Create a subscription for `request`.
    #[must_use]
    pub fn new(
        request: TickHistoryRequest,
        api: Arc<dyn MarketDataApi>,
        chart: Arc<dyn ChartPort>,
        resubscribe: ReconnectConfig,
    ) -> Self {
        Self {
            core: Arc::new(SubscriptionCore::new(request, api, chart)),
            resubscribe,
            reader: Mutex::new(None),
        }
    }

    /// Whether a reader task is attached to an upstream stream.
    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.reader
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    async fn open(&self, request: &TickHistoryRequest) -> Result<LiveStream, FeedError> {
        tokio::select! {
            () = self.core.lifetime().cancelled() => Err(FeedError::Cancelled),
            stream = self.core.api.subscribe(request) => stream,
        }
    }

    /// Attach a reader to a freshly opened stream.
    fn start_reader(&self, stream_id: Option<String>, updates: mpsc::Receiver<StreamMessage>) {
        let token = self.core.lifetime().child_token();
        if let Some(previous) = self.reader.lock().replace(token.clone()) {
            previous.cancel();
        }

        let core = Arc::clone(&self.core);
        tokio::spawn(read_stream(core, token, stream_id, updates));
    }

    fn stop_reader(&self) {
        if let Some(token) = self.reader.lock().take() {
            token.cancel();
        }
    }

    /// Give back a stream opened after the subscription was forgotten.
    async fn release(&self, stream_id: Option<&str>) {
        if let Some(id) = stream_id
            && let Err(e) = self.core.api.forget(id).await
        {
            debug!(key = %self.core.key(), error = %e, "Failed to release stream");
        }
    }
}

async fn read_stream(
    core: Arc<SubscriptionCore>,
    token: CancellationToken,
    stream_id: Option<String>,
    mut updates: mpsc::Receiver<StreamMessage>,
) {
    let key = core.key();
    debug!(%key, ?stream_id, "Stream reader started");

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            message = updates.recv() => {
                let Some(message) = message else {
                    debug!(%key, "Upstream stream closed");
                    break;
                };
                metrics::record_stream_message(core.request.style());
                match format_tick(&message) {
                    Some(quote) => core.deliver(vec![quote]),
                    None => debug!(%key, "Ignoring push without tick or ohlc"),
                }
            }
        }
    }

    if token.is_cancelled()
        && let Some(id) = stream_id.as_deref()
        && let Err(e) = core.api.forget(id).await
    {
        debug!(%key, error = %e, "Failed to release stream");
    }
    debug!(%key, "Stream reader stopped");
}

#[async_trait]
impl Subscription for LiveSubscription {
    fn key(&self) -> SubscriptionKey {
        self.core.key()
    }

    fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    fn last_stream_epoch(&self) -> Option<i64> {
        self.core.last_epoch()
    }

    async fn initial_fetch(&self) -> Result<Vec<Quote>, FeedError> {
        self.core.transition(SubscriptionState::FetchingInitial);
        metrics::record_history_request(RequestKind::Subscribe);

        let stream = self.open(&self.core.request).await?;
        if self.core.is_forgotten() {
            self.release(stream.stream_id.as_deref()).await;
            return Err(FeedError::Cancelled);
        }

        let quotes = self.core.process_history(stream.history)?;
        self.start_reader(stream.stream_id, stream.updates);
        self.core.transition(SubscriptionState::Streaming);

        info!(key = %self.key(), quotes = quotes.len(), "Live subscription started");
        Ok(quotes)
    }

    fn on_chart_data(&self, handler: ChartDataHandler) {
        self.core.set_handler(handler);
    }

    fn pause(&self) {
        self.stop_reader();
        if self.core.transition(SubscriptionState::Paused) {
            debug!(key = %self.key(), "Live subscription paused");
        }
    }

    async fn resume(&self) -> Result<Vec<Quote>, FeedError> {
        if self.core.is_forgotten() {
            return Ok(Vec::new());
        }

        let last = self.core.last_epoch();
        let request = last.map_or_else(
            || self.core.request.clone(),
            |epoch| self.core.request.continued_from(epoch),
        );

        let mut policy = ReconnectPolicy::new(self.resubscribe.clone());
        let stream = retry_with_backoff(
            &mut policy,
            self.core.lifetime(),
            FeedError::is_transient,
            || {
                metrics::record_resubscribe_attempt();
                self.core.api.subscribe(&request)
            },
        )
        .await
        .map_err(|e| e.into_inner().unwrap_or(FeedError::Cancelled))?;

        if self.core.is_forgotten() {
            self.release(stream.stream_id.as_deref()).await;
            return Err(FeedError::Cancelled);
        }

        let quotes = splice_after(
            self.core.process_history(stream.history)?,
            last,
            request.granularity,
        );
        self.start_reader(stream.stream_id, stream.updates);
        self.core.transition(SubscriptionState::Streaming);

        info!(key = %self.key(), gap = quotes.len(), "Live subscription resumed");
        Ok(quotes)
    }

    fn forget(&self) {
        if self.core.forget() {
            self.stop_reader();
        }
    }
}
