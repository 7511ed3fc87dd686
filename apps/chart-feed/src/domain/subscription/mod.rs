//! Subscription Registry Types
//!
//! Domain types for tracking the active streaming subscriptions of a chart.
//!
//! # Design
//!
//! The registry tracks:
//! - One entry per `(symbol, granularity)` key
//! - Replacement semantics: inserting an existing key hands back the old entry
//! - The lifecycle state each subscription reports
//!
//! Keys are a value type with structural equality, so symbols containing the
//! separator character cannot collide.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// =============================================================================
// Granularity
// =============================================================================

/// Bucket size of a quote in seconds; zero means raw ticks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Granularity(u32);

impl Granularity {
    /// Tick-level data (no aggregation).
    pub const TICK: Self = Self(0);

    /// Create a granularity from a bucket size in seconds.
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Bucket size in seconds.
    #[must_use]
    pub const fn as_secs(self) -> u32 {
        self.0
    }

    /// Whether this is tick-level data.
    #[must_use]
    pub const fn is_tick(self) -> bool {
        self.0 == 0
    }

    /// Seconds covered by one bar, treating ticks as one second.
    #[must_use]
    pub fn step_secs(self) -> i64 {
        i64::from(self.0.max(1))
    }

    /// Resolve a granularity from a chart period and interval unit.
    #[must_use]
    pub const fn from_period(period: u32, interval: ChartInterval) -> Self {
        Self(period.saturating_mul(interval.unit_secs()))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interval unit of a chart periodicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartInterval {
    /// Raw ticks.
    Tick,
    /// Seconds.
    Second,
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Days.
    Day,
}

impl ChartInterval {
    /// Seconds in one unit of this interval.
    #[must_use]
    pub const fn unit_secs(self) -> u32 {
        match self {
            Self::Tick => 0,
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    /// Parse an interval name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tick" | "ticks" => Some(Self::Tick),
            "second" | "seconds" | "s" => Some(Self::Second),
            "minute" | "minutes" | "m" => Some(Self::Minute),
            "hour" | "hours" | "h" => Some(Self::Hour),
            "day" | "days" | "d" => Some(Self::Day),
            _ => None,
        }
    }
}

/// Chart periodicity parameters accompanying a data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartParams {
    /// Number of interval units per bar.
    pub period: u32,
    /// Interval unit.
    pub interval: ChartInterval,
}

impl ChartParams {
    /// Create chart parameters.
    #[must_use]
    pub const fn new(period: u32, interval: ChartInterval) -> Self {
        Self { period, interval }
    }

    /// Tick chart parameters.
    #[must_use]
    pub const fn ticks() -> Self {
        Self::new(1, ChartInterval::Tick)
    }

    /// Granularity these parameters resolve to.
    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        Granularity::from_period(self.period, self.interval)
    }
}

// =============================================================================
// Key and State
// =============================================================================

/// Composite registry key of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// Instrument symbol.
    pub symbol: String,
    /// Bucket size.
    pub granularity: Granularity,
}

impl SubscriptionKey {
    /// Create a key.
    #[must_use]
    pub fn new(symbol: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            symbol: symbol.into(),
            granularity,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.symbol, self.granularity)
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Constructed, no request sent yet.
    Created,
    /// Initial history request in flight.
    FetchingInitial,
    /// Receiving pushes or polling.
    Streaming,
    /// Stopped by a connection loss; resumable.
    Paused,
    /// Torn down; terminal.
    Forgotten,
}

impl SubscriptionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FetchingInitial => "fetching_initial",
            Self::Streaming => "streaming",
            Self::Paused => "paused",
            Self::Forgotten => "forgotten",
        }
    }

    /// Whether the subscription has been torn down.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Forgotten)
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Registry of active subscriptions, at most one per key.
///
/// Thread-safe; the lock is never held while calling into an entry, so
/// callers may tear down what they remove without blocking other readers.
///
/// # Example
///
/// ```rust
/// use chart_feed::domain::subscription::{Granularity, SubscriptionKey, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
/// let key = SubscriptionKey::new("R_50", Granularity::from_secs(60));
///
/// assert!(registry.insert(key.clone(), "first").is_none());
///
/// // A second insert for the same key replaces the entry
/// assert_eq!(registry.insert(key.clone(), "second"), Some("first"));
/// assert_eq!(registry.len(), 1);
///
/// assert_eq!(registry.remove(&key), Some("second"));
/// assert!(registry.is_empty());
/// ```
pub struct SubscriptionRegistry<T> {
    entries: RwLock<HashMap<SubscriptionKey, T>>,
}

impl<T> Default for SubscriptionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register an entry, returning the one it replaced.
    pub fn insert(&self, key: SubscriptionKey, entry: T) -> Option<T> {
        self.entries.write().insert(key, entry)
    }

    /// Remove the entry for a key.
    pub fn remove(&self, key: &SubscriptionKey) -> Option<T> {
        self.entries.write().remove(key)
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<(SubscriptionKey, T)> {
        self.entries.write().drain().collect()
    }

    /// Check whether a key is registered.
    #[must_use]
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// All registered keys.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone> SubscriptionRegistry<T> {
    /// Get a clone of the entry for a key.
    #[must_use]
    pub fn get(&self, key: &SubscriptionKey) -> Option<T> {
        self.entries.read().get(key).cloned()
    }

    /// Clones of every entry with its key.
    #[must_use]
    pub fn entries(&self) -> Vec<(SubscriptionKey, T)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counts of registered subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered keys.
    pub subscription_count: usize,
    /// Number of distinct symbols across keys.
    pub symbol_count: usize,
}

impl<T> SubscriptionRegistry<T> {
    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries.read();
        let mut symbols: Vec<&str> = entries.keys().map(|k| k.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();

        RegistryStats {
            subscription_count: entries.len(),
            symbol_count: symbols.len(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn key(symbol: &str, secs: u32) -> SubscriptionKey {
        SubscriptionKey::new(symbol, Granularity::from_secs(secs))
    }

    #[test_case(1, ChartInterval::Tick, 0 ; "ticks")]
    #[test_case(1, ChartInterval::Second, 1 ; "one second")]
    #[test_case(5, ChartInterval::Minute, 300 ; "five minutes")]
    #[test_case(4, ChartInterval::Hour, 14_400 ; "four hours")]
    #[test_case(1, ChartInterval::Day, 86_400 ; "one day")]
    fn granularity_from_period(period: u32, interval: ChartInterval, expected: u32) {
        assert_eq!(Granularity::from_period(period, interval).as_secs(), expected);
    }

    #[test]
    fn tick_step_is_one_second() {
        assert_eq!(Granularity::TICK.step_secs(), 1);
        assert_eq!(Granularity::from_secs(60).step_secs(), 60);
    }

    #[test]
    fn interval_parses_names() {
        assert_eq!(ChartInterval::parse("Minute"), Some(ChartInterval::Minute));
        assert_eq!(ChartInterval::parse("tick"), Some(ChartInterval::Tick));
        assert_eq!(ChartInterval::parse("fortnight"), None);
    }

    #[test]
    fn key_display_joins_symbol_and_granularity() {
        assert_eq!(key("R_50", 60).to_string(), "R_50-60");
    }

    #[test]
    fn keys_with_separator_do_not_collide() {
        // "A-1" at 2 and "A" at 12 render as "A-1-2" and "A-12"
        let registry = SubscriptionRegistry::new();
        registry.insert(key("A-1", 2), 1);
        registry.insert(key("A", 12), 2);
        registry.insert(key("A-12", 0), 3);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(&key("A-1", 2)), Some(1));
    }

    #[test]
    fn insert_new_key() {
        let registry = SubscriptionRegistry::new();

        assert!(registry.insert(key("R_50", 0), "a").is_none());
        assert!(registry.contains(&key("R_50", 0)));
    }

    #[test]
    fn insert_existing_key_replaces() {
        let registry = SubscriptionRegistry::new();

        registry.insert(key("R_50", 60), "a");
        let replaced = registry.insert(key("R_50", 60), "b");

        assert_eq!(replaced, Some("a"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&key("R_50", 60)), Some("b"));
    }

    #[test]
    fn different_granularities_are_independent() {
        let registry = SubscriptionRegistry::new();

        registry.insert(key("R_50", 0), "ticks");
        registry.insert(key("R_50", 60), "minutes");

        assert_eq!(registry.len(), 2);
        registry.remove(&key("R_50", 0));
        assert!(registry.contains(&key("R_50", 60)));
    }

    #[test]
    fn remove_nonexistent_key_is_none() {
        let registry: SubscriptionRegistry<u8> = SubscriptionRegistry::new();
        assert!(registry.remove(&key("R_50", 0)).is_none());
    }

    #[test]
    fn drain_empties_registry() {
        let registry = SubscriptionRegistry::new();
        registry.insert(key("R_50", 0), 1);
        registry.insert(key("R_100", 0), 2);

        let drained = registry.drain();

        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn stats_count_distinct_symbols() {
        let registry = SubscriptionRegistry::new();
        registry.insert(key("R_50", 0), 1);
        registry.insert(key("R_50", 60), 2);
        registry.insert(key("R_100", 0), 3);

        let stats = registry.stats();

        assert_eq!(stats.subscription_count, 3);
        assert_eq!(stats.symbol_count, 2);
    }

    #[test]
    fn thread_safety_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let mut handles = vec![];

        for i in 0..10u32 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.insert(key(&format!("SYM{i}"), 0), i);
                r.insert(key("SHARED", 0), i);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // 10 unique keys + 1 shared key replaced by every thread
        assert_eq!(registry.len(), 11);
    }
}
