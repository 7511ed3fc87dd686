//! Static Trading Times
//!
//! A [`TradingTimesPort`] built from a fixed table. Symbols not listed are
//! treated as closed, with a live feed and no delay.

use std::collections::{HashMap, HashSet};

use crate::application::ports::TradingTimesPort;

/// Market status table.
#[derive(Debug, Clone, Default)]
pub struct StaticTradingTimes {
    open: HashSet<String>,
    unavailable: HashSet<String>,
    delays: HashMap<String, u32>,
    names: HashMap<String, String>,
}

impl StaticTradingTimes {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a market open.
    #[must_use]
    pub fn open(mut self, symbol: impl Into<String>) -> Self {
        self.open.insert(symbol.into());
        self
    }

    /// Mark a symbol as having no feed.
    #[must_use]
    pub fn unavailable(mut self, symbol: impl Into<String>) -> Self {
        self.unavailable.insert(symbol.into());
        self
    }

    /// Mark a market open with a publication delay.
    #[must_use]
    pub fn delayed(mut self, symbol: impl Into<String>, minutes: u32) -> Self {
        let symbol = symbol.into();
        self.delays.insert(symbol.clone(), minutes);
        self.open(symbol)
    }

    /// Set a display name.
    #[must_use]
    pub fn named(mut self, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(symbol.into(), name.into());
        self
    }
}

impl TradingTimesPort for StaticTradingTimes {
    fn is_feed_unavailable(&self, symbol: &str) -> bool {
        self.unavailable.contains(symbol)
    }

    fn is_market_opened(&self, symbol: &str) -> bool {
        self.open.contains(symbol)
    }

    fn delay_minutes(&self, symbol: &str) -> u32 {
        self.delays.get(symbol).copied().unwrap_or(0)
    }

    fn display_name(&self, symbol: &str) -> String {
        self.names
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| symbol.to_string())
    }
}
