//! Delayed Subscription
//!
//! For feeds published with a delay there is no push stream: history is
//! polled on a fixed interval, each poll continuing from the last epoch seen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ChartDataHandler, Subscription, SubscriptionCore};
use crate::application::ports::{ChartPort, FeedError, MarketDataApi};
use crate::domain::streaming::{Quote, TickHistoryRequest};
use crate::domain::subscription::{SubscriptionKey, SubscriptionState};
use crate::domain::window::splice_after;
use crate::infrastructure::metrics::{self, RequestKind};

/// Poll-based subscription for delayed feeds.
pub struct DelayedSubscription {
    core: Arc<SubscriptionCore>,
    delay_minutes: u32,
    poll_interval: Duration,
    timer: Mutex<Option<CancellationToken>>,
}

impl DelayedSubscription {
    /// Create a subscription; the request start is moved back by the delay.
    #[must_use]
    pub fn new(
        request: TickHistoryRequest,
        api: Arc<dyn MarketDataApi>,
        chart: Arc<dyn ChartPort>,
        delay_minutes: u32,
        poll_interval: Duration,
    ) -> Self {
        let request = TickHistoryRequest {
            start: request.start - i64::from(delay_minutes) * 60,
            ..request
        };

        Self {
            core: Arc::new(SubscriptionCore::new(request, api, chart)),
            delay_minutes,
            poll_interval,
            timer: Mutex::new(None),
        }
    }

    /// Publication delay in minutes.
    #[must_use]
    pub const fn delay_minutes(&self) -> u32 {
        self.delay_minutes
    }

    /// Effective request after the delay offset.
    #[must_use]
    pub fn request(&self) -> &TickHistoryRequest {
        &self.core.request
    }

    /// Whether the poll timer is armed.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    fn start_timer(&self) {
        let token = {
            let mut slot = self.timer.lock();
            if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return;
            }
            let token = self.core.lifetime().child_token();
            *slot = Some(token.clone());
            token
        };

        tokio::spawn(poll_loop(Arc::clone(&self.core), token, self.poll_interval));
    }

    fn end_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }
}

async fn poll_loop(core: Arc<SubscriptionCore>, token: CancellationToken, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(last) = core.last_epoch() else {
            error!(key = %core.key(), "Unable to poll delayed feed without the epoch of a previous tick");
            token.cancel();
            break;
        };

        let request = core.request.continued_from(last);
        metrics::record_history_request(RequestKind::Poll);
        let response = tokio::select! {
            () = token.cancelled() => break,
            response = core.api.get_tick_history(&request) => response,
        };

        match response.and_then(|r| core.process_history(r)) {
            Ok(quotes) => core.deliver(splice_after(quotes, Some(last), request.granularity)),
            Err(e) => warn!(key = %core.key(), error = %e, "Delayed feed poll failed"),
        }
    }

    debug!(key = %core.key(), "Delayed poll timer stopped");
}

#[async_trait]
impl Subscription for DelayedSubscription {
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
        metrics::record_history_request(RequestKind::Delayed);

        let response = tokio::select! {
            () = self.core.lifetime().cancelled() => return Err(FeedError::Cancelled),
            response = self.core.api.get_tick_history(&self.core.request) => response?,
        };
        let quotes = self.core.process_history(response)?;

        self.start_timer();
        self.core.transition(SubscriptionState::Streaming);
        info!(
            key = %self.key(),
            delay_minutes = self.delay_minutes,
            quotes = quotes.len(),
            "Delayed subscription started"
        );
        Ok(quotes)
    }

    fn on_chart_data(&self, handler: ChartDataHandler) {
        self.core.set_handler(handler);
    }

    fn pause(&self) {
        self.end_timer();
        self.core.transition(SubscriptionState::Paused);
    }

    async fn resume(&self) -> Result<Vec<Quote>, FeedError> {
        if self.core.is_forgotten() {
            return Ok(Vec::new());
        }

        let Some(last) = self.core.last_epoch() else {
            error!(key = %self.key(), "Unable to resume delayed feed without the epoch of a previous tick");
            return Ok(Vec::new());
        };

        let request = self.core.request.continued_from(last);
        metrics::record_history_request(RequestKind::Resume);
        let response = self.core.api.get_tick_history(&request).await?;
        let quotes = splice_after(self.core.process_history(response)?, Some(last), request.granularity);

        if !self.core.is_forgotten() {
            self.start_timer();
            self.core.transition(SubscriptionState::Streaming);
        }
        Ok(quotes)
    }

    fn forget(&self) {
        self.end_timer();
        self.core.forget();
    }
}
