//! Chart Port (Driven Port)
//!
//! Interface for the chart rendering engine the feed writes into.

use crate::domain::streaming::Quote;
use crate::domain::window::ChartRange;

/// How quotes are merged into the chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    /// Main series; overlapping bars have their OHL replaced.
    Primary,
    /// Comparison series merged without rebuilding the data set.
    Secondary {
        /// Comparison symbol.
        symbol: String,
    },
}

impl UpdateMode {
    /// Update mode for an optional comparison symbol.
    #[must_use]
    pub fn for_comparison(symbol: Option<&str>) -> Self {
        symbol.map_or(Self::Primary, |s| Self::Secondary {
            symbol: s.to_string(),
        })
    }
}

/// Port for the chart rendering engine.
///
/// Calls are synchronous and cheap; implementations must not block.
pub trait ChartPort: Send + Sync {
    /// Symbol of the main chart panel.
    fn primary_symbol(&self) -> Option<String>;

    /// Whether the chart has been torn down.
    fn is_destroyed(&self) -> bool;

    /// Whether the chart shows a fixed, non-scrolling range.
    fn is_static(&self) -> bool;

    /// Number of bars the chart displays.
    fn max_ticks(&self) -> usize;

    /// Epoch of the last bar of the main data set.
    fn last_bar_epoch(&self) -> Option<i64>;

    /// Number of bars in the main data set.
    fn data_set_len(&self) -> usize;

    /// Merge quotes into the chart.
    fn update_chart_data(&self, quotes: &[Quote], mode: &UpdateMode);

    /// Insert an empty-close bar at `epoch` so the series shows a gap there.
    fn append_stopper(&self, epoch: i64);

    /// Rebuild the main data set.
    fn create_data_set(&self);

    /// Change the number of visible bars.
    fn set_max_ticks(&self, max_ticks: usize);

    /// Set the visible range.
    fn set_range(&self, range: ChartRange);

    /// Reset the view to the latest data.
    fn home(&self);

    /// Scroll so that `position` bars are in view.
    fn scroll_to(&self, position: usize);

    /// Enable or disable the chart.
    fn set_availability(&self, available: bool);

    /// Reload everything from scratch.
    fn refresh(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_mode_for_comparison() {
        assert_eq!(UpdateMode::for_comparison(None), UpdateMode::Primary);
        assert_eq!(
            UpdateMode::for_comparison(Some("R_100")),
            UpdateMode::Secondary {
                symbol: "R_100".to_string()
            }
        );
    }
}
