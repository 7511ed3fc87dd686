//! Streamed data and connection handling.
//!
//! New quotes from subscriptions are appended to the chart here. On
//! connection loss every subscription is paused; on reconnect they either
//! resume from their last epoch or, after a long outage, the chart reloads.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Feed;
use crate::application::ports::UpdateMode;
use crate::application::services::subscription::Subscription;
use crate::domain::streaming::Quote;
use crate::domain::subscription::SubscriptionKey;
use crate::infrastructure::metrics;

impl Feed {
    /// Append streamed quotes to the series of `key`.
    pub(crate) fn append_chart_data(
        &self,
        quotes: &[Quote],
        key: &SubscriptionKey,
        comparison: Option<&str>,
    ) {
        if self.forget_if_end_epoch(key) == Some(true) {
            return;
        }

        if let Some(end) = self.range_window().end_epoch
            && self.chart.last_bar_epoch() != Some(end)
        {
            self.chart.append_stopper(end);
            self.chart.create_data_set();
        }

        let mode = UpdateMode::for_comparison(comparison);
        self.chart.update_chart_data(quotes, &mode);
        if comparison.is_none() {
            self.chart.create_data_set();
        }

        self.emit_data_update(quotes, comparison, false);
    }

    /// Forget the subscription of `key` once its stream has passed the
    /// pinned end.
    ///
    /// Returns `None` when `key` has no subscription, otherwise whether the
    /// pending quotes must be dropped. A tick stream on a live chart keeps
    /// its final quotes while the end is still ahead of the last bar.
    pub(crate) fn forget_if_end_epoch(&self, key: &SubscriptionKey) -> Option<bool> {
        let subscription = self.registry.get(key)?;

        let Some(end) = self.range_window().end_epoch else {
            return Some(false);
        };
        let Some(last) = subscription.last_stream_epoch() else {
            return Some(false);
        };
        if last + i64::from(key.granularity.as_secs()) <= end {
            return Some(false);
        }

        let keep = key.granularity.is_tick()
            && !self.chart.is_static()
            && self.chart.last_bar_epoch().is_some_and(|bar| end >= bar);

        info!(%key, end, last, "Stream passed pinned end, forgetting");
        self.forget_stream(key);
        Some(!keep)
    }

    /// React to the connection opening or closing.
    pub async fn on_connection_changed(&self, opened: bool) {
        let closed_at = {
            let mut connection = self.connection.lock();
            if connection.opened == opened {
                return;
            }
            connection.opened = opened;
            if opened {
                connection.closed_at.take()
            } else {
                connection.closed_at = Some(self.clock.now());
                None
            }
        };

        metrics::record_connection_change(opened);
        let entries = self.registry.entries();

        if !opened {
            info!(subscriptions = entries.len(), "Connection closed, pausing streams");
            for (_, subscription) in &entries {
                subscription.pause();
            }
            return;
        }

        if entries.is_empty() {
            return;
        }

        let elapsed = closed_at.map_or(0, |at| (self.clock.now() - at).num_seconds());
        let ticks = i64::try_from(self.chart.max_ticks()).unwrap_or(i64::MAX);
        let max_idle = self.granularity().step_secs().saturating_mul(ticks);

        if elapsed >= max_idle {
            info!(elapsed, max_idle, "Connection restored after long outage, refreshing chart");
            self.chart.refresh();
            return;
        }

        info!(elapsed, subscriptions = entries.len(), "Connection restored, resuming streams");
        join_all(
            entries
                .into_iter()
                .map(|(key, subscription)| self.resume_stream(key, subscription)),
        )
        .await;
    }

    /// Resume one subscription and append the quotes missed while paused.
    pub(crate) async fn resume_stream(&self, key: SubscriptionKey, subscription: Arc<dyn Subscription>) {
        let quotes = match subscription.resume().await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(%key, error = %e, "Failed to resume stream");
                return;
            }
        };

        let still_active = self
            .registry
            .get(&key)
            .is_some_and(|active| Arc::ptr_eq(&active, &subscription));
        if !still_active || self.chart.is_destroyed() || quotes.is_empty() {
            debug!(%key, still_active, quotes = quotes.len(), "Skipping resumed quotes");
            return;
        }

        let comparison = (!self.is_primary(&key.symbol)).then(|| key.symbol.clone());
        self.append_chart_data(&quotes, &key, comparison.as_deref());
    }

    /// Follow a connection state channel until the feed shuts down.
    pub fn watch_connection(self: &Arc<Self>, mut state: watch::Receiver<bool>) -> JoinHandle<()> {
        let feed = Arc::clone(self);
        let lifetime = self.lifetime.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = lifetime.cancelled() => break,
                    changed = state.changed() => {
                        if changed.is_err() {
                            debug!("Connection state channel closed");
                            break;
                        }
                        let opened = *state.borrow_and_update();
                        feed.on_connection_changed(opened).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::events::FeedEventKind;
    use crate::application::services::feed::{FeedOptions, FeedPorts};
    use crate::domain::subscription::{ChartInterval, ChartParams, SubscriptionState};
    use crate::domain::window::RangeWindow;
    use crate::infrastructure::chart::InMemoryChart;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::trading_times::StaticTradingTimes;
    use crate::testing::{
        RecordingNotifier, ScriptedApi, candle_history, ohlc_push, tick_history, tick_push,
    };

    const NOW: i64 = 1_700_000_000;

    struct Harness {
        feed: Arc<Feed>,
        api: Arc<ScriptedApi>,
        chart: Arc<InMemoryChart>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let api = Arc::new(ScriptedApi::default());
        let chart = Arc::new(InMemoryChart::new("R_50"));
        let clock = Arc::new(ManualClock::at_epoch(NOW));
        let feed = Feed::new(
            FeedPorts {
                api: api.clone(),
                chart: chart.clone(),
                notifier: Arc::new(RecordingNotifier::default()),
                trading_times: Arc::new(StaticTradingTimes::new().open("R_50")),
                clock: clock.clone(),
            },
            FeedOptions::default(),
        );
        Harness {
            feed,
            api,
            chart,
            clock,
        }
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW - 600, 0).unwrap()
    }

    fn key() -> SubscriptionKey {
        SubscriptionKey::new("R_50", ChartParams::new(1, ChartInterval::Tick).granularity())
    }

    async fn stream(h: &Harness) -> tokio::sync::mpsc::Sender<crate::domain::streaming::StreamMessage> {
        let updates = h.api.push_subscription(tick_history(&[NOW - 2, NOW - 1]), "s1");
        h.feed
            .fetch_initial_data("R_50", start(), None, ChartParams::new(1, ChartInterval::Tick))
            .await;
        updates
    }

    #[tokio::test]
    async fn pushed_ticks_reach_chart_and_events() {
        let h = harness();
        let updates = stream(&h).await;
        let mut events = h.feed.events().subscribe();

        updates.send(tick_push(NOW, "100.5")).await.unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.kind(), FeedEventKind::MasterDataUpdate);
        assert_eq!(h.chart.bars().last().unwrap().close, Decimal::new(1005, 1));
    }

    #[tokio::test]
    async fn ohlc_push_refreshes_forming_candle() {
        let h = harness();
        let params = ChartParams::new(1, ChartInterval::Minute);
        let updates = h
            .api
            .push_subscription(candle_history(&[NOW - 120, NOW - 60]), "c1");
        h.feed.fetch_initial_data("R_50", start(), None, params).await;
        let mut events = h.feed.events().subscribe();

        updates.send(ohlc_push(NOW - 60, "1.75")).await.unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.kind(), FeedEventKind::MasterDataUpdate);
        let bars = h.chart.bars();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, Decimal::new(175, 2));
    }

    #[tokio::test]
    async fn disconnect_pauses_and_short_outage_resumes() {
        let h = harness();
        let _updates = stream(&h).await;
        let _resumed = h.api.push_subscription(tick_history(&[NOW - 1, NOW + 5]), "s2");

        h.feed.on_connection_changed(false).await;
        let subscription = h.feed.subscription(&key()).unwrap();
        assert_eq!(subscription.state(), SubscriptionState::Paused);

        h.clock.advance_secs(10);
        h.feed.on_connection_changed(true).await;

        assert_eq!(h.api.subscribe_requests().len(), 2);
        assert_eq!(h.chart.bars().last().unwrap().epoch, NOW + 5);
        assert_eq!(h.chart.refresh_count(), 0);
    }

    #[tokio::test]
    async fn long_outage_refreshes_chart() {
        let h = harness();
        let _updates = stream(&h).await;

        h.feed.on_connection_changed(false).await;
        h.clock.advance_secs(10_000);
        h.feed.on_connection_changed(true).await;

        assert_eq!(h.chart.refresh_count(), 1);
        assert_eq!(h.api.subscribe_requests().len(), 1);
    }

    #[tokio::test]
    async fn repeated_state_is_ignored() {
        let h = harness();
        let _updates = stream(&h).await;

        h.feed.on_connection_changed(true).await;

        assert_eq!(h.api.subscribe_requests().len(), 1);
        assert!(h.feed.is_connection_opened());
    }

    #[tokio::test]
    async fn stream_past_pinned_end_is_forgotten() {
        let h = harness();
        let _updates = stream(&h).await;
        h.feed.set_range_window(RangeWindow::new(None, Some(NOW - 10), 0));

        let drop_quotes = h.feed.forget_if_end_epoch(&key());

        assert_eq!(drop_quotes, Some(true));
        assert!(h.feed.active_keys().is_empty());
        assert_eq!(h.feed.forget_if_end_epoch(&key()), None);
    }

    #[tokio::test]
    async fn pinned_end_inserts_stopper() {
        let h = harness();
        let _updates = stream(&h).await;
        h.feed.set_range_window(RangeWindow::new(None, Some(NOW + 100), 0));

        h.feed
            .append_chart_data(&[Quote::tick(NOW, Decimal::ONE)], &key(), None);

        assert_eq!(h.chart.stoppers(), vec![NOW + 100]);
    }
}
