//! Market Data Streaming Types
//!
//! Core domain types for chart data: the canonical [`Quote`], the payload of
//! data-update events, and the wire shapes of the history API together with
//! the formatter that converts between them.

pub mod formatter;
pub mod wire;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use formatter::{first_epoch, format_history, format_tick};
pub use wire::{
    ApiErrorBody, Candle, History, HistoryStyle, Numeric, Ohlc, StreamMessage, Tick,
    TickHistoryRequest, TickHistoryResponse,
};

/// The push payload a quote was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawPayload {
    /// Raw tick push.
    Tick(Tick),
    /// Raw OHLC push.
    Ohlc(Ohlc),
}

/// One bar or tick.
///
/// `open`, `high` and `low` are only set for candle data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Bar open (or tick) epoch in seconds.
    pub epoch: i64,
    /// Close (or tick) price.
    pub close: Decimal,
    /// Open price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    /// High price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    /// Low price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    /// Original push payload, kept for consumers that need its shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawPayload>,
}

impl Quote {
    /// Create a tick quote.
    #[must_use]
    pub const fn tick(epoch: i64, close: Decimal) -> Self {
        Self {
            epoch,
            close,
            open: None,
            high: None,
            low: None,
            raw: None,
        }
    }

    /// Create a candle quote.
    #[must_use]
    pub const fn candle(
        epoch: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            epoch,
            close,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            raw: None,
        }
    }

    /// Attach the originating push payload.
    #[must_use]
    pub fn with_raw(mut self, raw: RawPayload) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Whether this quote carries OHLC values.
    #[must_use]
    pub const fn is_candle(&self) -> bool {
        self.open.is_some() && self.high.is_some() && self.low.is_some()
    }

    /// Quote time as a UTC date.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.epoch, 0)
    }
}

/// Payload of a data-update event: the newest quote and the close before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpdate {
    /// The last quote of the update.
    pub quote: Quote,
    /// Close of the quote preceding it, if the update had one.
    pub prev_close: Option<Decimal>,
}

impl DataUpdate {
    /// Build the update for the tail of `quotes`.
    ///
    /// Returns `None` for an empty slice.
    #[must_use]
    pub fn from_tail(quotes: &[Quote]) -> Option<Self> {
        let (last, rest) = quotes.split_last()?;
        Some(Self {
            quote: last.clone(),
            prev_close: rest.last().map(|q| q.close),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_update_uses_previous_close() {
        let quotes = vec![
            Quote::tick(1, Decimal::new(100, 0)),
            Quote::tick(2, Decimal::new(101, 0)),
        ];

        let update = DataUpdate::from_tail(&quotes).unwrap();
        assert_eq!(update.quote.epoch, 2);
        assert_eq!(update.prev_close, Some(Decimal::new(100, 0)));
    }

    #[test]
    fn data_update_single_quote_has_no_previous() {
        let quotes = vec![Quote::tick(1, Decimal::new(100, 0))];

        let update = DataUpdate::from_tail(&quotes).unwrap();
        assert!(update.prev_close.is_none());
        assert!(DataUpdate::from_tail(&[]).is_none());
    }

    #[test]
    fn candle_quote_is_candle() {
        let candle = Quote::candle(
            60,
            Decimal::ONE,
            Decimal::TWO,
            Decimal::ZERO,
            Decimal::ONE,
        );
        assert!(candle.is_candle());
        assert!(!Quote::tick(60, Decimal::ONE).is_candle());
    }
}
