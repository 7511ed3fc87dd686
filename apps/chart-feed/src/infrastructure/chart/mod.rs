//! In-Memory Chart
//!
//! A [`ChartPort`] that keeps the chart's data sets in memory. Used by the
//! headless service and as the chart double in tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::application::ports::{ChartPort, UpdateMode};
use crate::domain::streaming::Quote;
use crate::domain::window::ChartRange;

/// Bars shown by default.
pub const DEFAULT_MAX_TICKS: usize = 300;

#[derive(Debug)]
struct ChartState {
    primary_symbol: Option<String>,
    destroyed: bool,
    is_static: bool,
    available: bool,
    max_ticks: usize,
    bars: Vec<Quote>,
    secondary: HashMap<String, Vec<Quote>>,
    stoppers: Vec<i64>,
    range: Option<ChartRange>,
    scroll_position: Option<usize>,
    data_set_builds: usize,
    refresh_count: usize,
    home_count: usize,
}

/// Chart data held in memory.
#[derive(Debug)]
pub struct InMemoryChart {
    state: Mutex<ChartState>,
}

impl InMemoryChart {
    /// Create an empty chart for a primary symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(ChartState {
                primary_symbol: Some(symbol.into()),
                destroyed: false,
                is_static: false,
                available: true,
                max_ticks: DEFAULT_MAX_TICKS,
                bars: Vec::new(),
                secondary: HashMap::new(),
                stoppers: Vec::new(),
                range: None,
                scroll_position: None,
                data_set_builds: 0,
                refresh_count: 0,
                home_count: 0,
            }),
        }
    }

    /// Set the number of visible bars.
    #[must_use]
    pub fn with_max_ticks(self, max_ticks: usize) -> Self {
        self.state.lock().max_ticks = max_ticks;
        self
    }

    /// Change the main symbol.
    pub fn set_primary_symbol(&self, symbol: Option<String>) {
        self.state.lock().primary_symbol = symbol;
    }

    /// Tear the chart down.
    pub fn destroy(&self) {
        self.state.lock().destroyed = true;
    }

    /// Switch between a fixed and a scrolling range.
    pub fn set_static(&self, is_static: bool) {
        self.state.lock().is_static = is_static;
    }

    /// Bars of the main data set.
    #[must_use]
    pub fn bars(&self) -> Vec<Quote> {
        self.state.lock().bars.clone()
    }

    /// Bars of a comparison series.
    #[must_use]
    pub fn secondary_series(&self, symbol: &str) -> Vec<Quote> {
        self.state
            .lock()
            .secondary
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    /// Epochs where gap markers were inserted.
    #[must_use]
    pub fn stoppers(&self) -> Vec<i64> {
        self.state.lock().stoppers.clone()
    }

    /// Times the chart was reloaded from scratch.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.state.lock().refresh_count
    }

    /// Times the view was reset to the latest data.
    #[must_use]
    pub fn home_count(&self) -> usize {
        self.state.lock().home_count
    }

    /// Times the main data set was rebuilt.
    #[must_use]
    pub fn data_set_builds(&self) -> usize {
        self.state.lock().data_set_builds
    }

    /// Last visible range set.
    #[must_use]
    pub fn range(&self) -> Option<ChartRange> {
        self.state.lock().range
    }

    /// Last scroll position.
    #[must_use]
    pub fn scroll_position(&self) -> Option<usize> {
        self.state.lock().scroll_position
    }

    /// Whether the chart is enabled.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state.lock().available
    }
}

/// Merge `incoming` into an ascending series. A quote at an existing epoch
/// replaces it.
fn merge(series: &mut Vec<Quote>, incoming: &[Quote]) {
    for quote in incoming {
        match series.binary_search_by_key(&quote.epoch, |q| q.epoch) {
            Ok(index) => series[index] = quote.clone(),
            Err(index) => series.insert(index, quote.clone()),
        }
    }
}

impl ChartPort for InMemoryChart {
    fn primary_symbol(&self) -> Option<String> {
        self.state.lock().primary_symbol.clone()
    }

    fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn is_static(&self) -> bool {
        self.state.lock().is_static
    }

    fn max_ticks(&self) -> usize {
        self.state.lock().max_ticks
    }

    fn last_bar_epoch(&self) -> Option<i64> {
        self.state.lock().bars.last().map(|q| q.epoch)
    }

    fn data_set_len(&self) -> usize {
        self.state.lock().bars.len()
    }

    fn update_chart_data(&self, quotes: &[Quote], mode: &UpdateMode) {
        trace!(count = quotes.len(), ?mode, "Updating chart data");
        let mut state = self.state.lock();
        match mode {
            UpdateMode::Primary => merge(&mut state.bars, quotes),
            UpdateMode::Secondary { symbol } => {
                merge(state.secondary.entry(symbol.clone()).or_default(), quotes);
            }
        }
    }

    fn append_stopper(&self, epoch: i64) {
        self.state.lock().stoppers.push(epoch);
    }

    fn create_data_set(&self) {
        self.state.lock().data_set_builds += 1;
    }

    fn set_max_ticks(&self, max_ticks: usize) {
        self.state.lock().max_ticks = max_ticks;
    }

    fn set_range(&self, range: ChartRange) {
        self.state.lock().range = Some(range);
    }

    fn home(&self) {
        let mut state = self.state.lock();
        state.home_count += 1;
        state.scroll_position = None;
    }

    fn scroll_to(&self, position: usize) {
        self.state.lock().scroll_position = Some(position);
    }

    fn set_availability(&self, available: bool) {
        self.state.lock().available = available;
    }

    fn refresh(&self) {
        self.state.lock().refresh_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn tick(epoch: i64, close: i64) -> Quote {
        Quote::tick(epoch, Decimal::from(close))
    }

    #[test]
    fn primary_merge_replaces_equal_epoch() {
        let chart = InMemoryChart::new("R_50");

        chart.update_chart_data(&[tick(1, 10), tick(3, 30)], &UpdateMode::Primary);
        chart.update_chart_data(&[tick(2, 20), tick(3, 31)], &UpdateMode::Primary);

        let bars = chart.bars();
        assert_eq!(bars.iter().map(|q| q.epoch).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(bars[2].close, Decimal::from(31));
        assert_eq!(chart.last_bar_epoch(), Some(3));
    }

    #[test]
    fn secondary_series_kept_apart() {
        let chart = InMemoryChart::new("R_50");

        chart.update_chart_data(&[tick(1, 10)], &UpdateMode::for_comparison(Some("R_100")));

        assert!(chart.bars().is_empty());
        assert_eq!(chart.secondary_series("R_100").len(), 1);
        assert!(chart.secondary_series("R_25").is_empty());
    }

    #[test]
    fn defaults() {
        let chart = InMemoryChart::new("R_50");

        assert_eq!(chart.primary_symbol().as_deref(), Some("R_50"));
        assert_eq!(chart.max_ticks(), DEFAULT_MAX_TICKS);
        assert!(chart.is_available());
        assert!(!chart.is_destroyed());
        assert!(!chart.is_static());
        assert_eq!(InMemoryChart::new("R_50").with_max_ticks(10).max_ticks(), 10);
    }
}
