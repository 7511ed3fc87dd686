//! Range Window
//!
//! The optional fixed time range a chart session is pinned to, with the margin
//! padding applied at both edges. When an end is pinned no live data is
//! requested: the session is a pure historical view.

use serde::{Deserialize, Serialize};

use super::streaming::Quote;
use super::subscription::Granularity;

/// Fixed range of a chart session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeWindow {
    /// Pinned start epoch.
    pub start_epoch: Option<i64>,
    /// Pinned end epoch.
    pub end_epoch: Option<i64>,
    /// Padding in seconds applied outside the pinned edges.
    pub margin: i64,
}

impl RangeWindow {
    /// Unpinned window tracking "now".
    pub const UNBOUNDED: Self = Self {
        start_epoch: None,
        end_epoch: None,
        margin: 0,
    };

    /// Create a window.
    #[must_use]
    pub const fn new(start_epoch: Option<i64>, end_epoch: Option<i64>, margin: i64) -> Self {
        Self {
            start_epoch,
            end_epoch,
            margin,
        }
    }

    /// Whether either edge is pinned.
    #[must_use]
    pub const fn is_pinned(&self) -> bool {
        self.start_epoch.is_some() || self.end_epoch.is_some()
    }

    /// Request start: the pinned start minus margin, else the suggestion.
    #[must_use]
    pub fn effective_start(&self, suggested_start: i64) -> i64 {
        self.start_epoch
            .map_or(suggested_start, |start| start - self.margin)
    }

    /// Request end: the pinned end plus margin.
    #[must_use]
    pub fn effective_end(&self) -> Option<i64> {
        self.end_epoch.map(|end| end + self.margin)
    }

    /// Whether a pagination request for `[start, end]` reaches outside the
    /// pinned edges.
    #[must_use]
    pub fn violates(&self, start: i64, end: i64) -> bool {
        self.start_epoch.is_some_and(|s| start < s) || self.end_epoch.is_some_and(|e| end > e)
    }

    /// Trim a quote sequence to the window.
    ///
    /// Trimming only happens on pinned edges when a margin is set. One quote
    /// before the start is kept for context; at the end the first quote at or
    /// past the edge is kept, plus the next one when it lands exactly on it.
    #[must_use]
    pub fn trim_quotes(&self, quotes: Vec<Quote>) -> Vec<Quote> {
        let mut trimmed = quotes;
        if trimmed.is_empty() || self.margin == 0 {
            return trimmed;
        }

        if let Some(start) = self.start_epoch
            && let Some(index) = trimmed.iter().position(|q| q.epoch >= start)
        {
            trimmed.drain(..index.saturating_sub(1));
        }

        if let Some(end) = self.end_epoch
            && let Some(index) = trimmed.iter().position(|q| q.epoch >= end)
        {
            let addon = if trimmed[index].epoch == end { 2 } else { 1 };
            trimmed.truncate(index + addon);
        }

        trimmed
    }

    /// Visible range for the chart given the number of bars it shows.
    ///
    /// With only an end pinned, the left edge is `max_ticks` bars before it.
    #[must_use]
    pub fn visible_range(&self, granularity: Granularity, max_ticks: usize) -> ChartRange {
        let Some(end) = self.end_epoch else {
            return ChartRange {
                left: self.start_epoch,
                right: None,
                granularity,
            };
        };

        let ticks = i64::try_from(max_ticks).unwrap_or(i64::MAX);
        let span = granularity.step_secs().saturating_mul(ticks);
        ChartRange {
            left: Some(self.start_epoch.unwrap_or(end.saturating_sub(span))),
            right: Some(end),
            granularity,
        }
    }
}

/// Range a chart is asked to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRange {
    /// Left edge epoch; `None` leaves it to the chart.
    pub left: Option<i64>,
    /// Right edge epoch; `None` means "now".
    pub right: Option<i64>,
    /// Bar size of the displayed data.
    pub granularity: Granularity,
}

/// Drop quotes a chart already holds, given the epoch of its last quote.
///
/// Ticks keep strictly newer quotes. Candles keep the last epoch as well, so
/// a candle still forming is refreshed in place.
#[must_use]
pub fn splice_after(quotes: Vec<Quote>, last_epoch: Option<i64>, granularity: Granularity) -> Vec<Quote> {
    let Some(last) = last_epoch else {
        return quotes;
    };

    quotes
        .into_iter()
        .filter(|q| {
            if granularity.is_tick() {
                q.epoch > last
            } else {
                q.epoch >= last
            }
        })
        .collect()
}
