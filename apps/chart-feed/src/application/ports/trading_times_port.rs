//! Trading Times Port (Driven Port)
//!
//! Market status lookups per symbol.

/// Port for market status.
pub trait TradingTimesPort: Send + Sync {
    /// Whether the instrument has no data feed at all.
    fn is_feed_unavailable(&self, symbol: &str) -> bool;

    /// Whether the market for the instrument is currently open.
    fn is_market_opened(&self, symbol: &str) -> bool;

    /// Publication delay of the instrument's feed, in minutes.
    fn delay_minutes(&self, symbol: &str) -> u32;

    /// Human-readable name of the instrument.
    fn display_name(&self, symbol: &str) -> String {
        symbol.to_string()
    }
}
