//! Quote Formatter
//!
//! Converts tick-series and candle-series responses, and single push events,
//! into canonical [`Quote`] values. Pure functions with no side effects.
//!
//! A `None` result means "no recognized data", never an error: callers treat
//! it as an empty series.

use super::{Quote, RawPayload, StreamMessage, TickHistoryResponse};
use super::wire::{Candle, History, Ohlc, Tick};

/// Format a history response into quotes, ascending by epoch.
///
/// Tick history arrays are zipped, so the result is as long as the shorter
/// of `times` and `prices`. Returns `None` when the response carries neither
/// `history` nor `candles`.
#[must_use]
pub fn format_history(response: &TickHistoryResponse) -> Option<Vec<Quote>> {
    if let Some(history) = &response.history {
        return Some(format_tick_series(history));
    }

    response
        .candles
        .as_ref()
        .map(|candles| candles.iter().filter_map(format_candle).collect())
}

/// Format a single push event into a quote, keeping the raw payload.
///
/// Returns `None` when the message carries neither `tick` nor `ohlc`.
#[must_use]
pub fn format_tick(message: &StreamMessage) -> Option<Quote> {
    if let Some(tick) = &message.tick {
        return format_pushed_tick(tick);
    }

    message.ohlc.as_ref().and_then(format_pushed_ohlc)
}

/// Epoch of the first entry of a history response, if any.
#[must_use]
pub fn first_epoch(response: &TickHistoryResponse) -> Option<i64> {
    if let Some(candles) = &response.candles
        && let Some(first) = candles.first()
    {
        return first.epoch.to_epoch();
    }

    response
        .history
        .as_ref()
        .and_then(|h| h.times.first())
        .and_then(super::Numeric::to_epoch)
}

fn format_tick_series(history: &History) -> Vec<Quote> {
    history
        .times
        .iter()
        .zip(&history.prices)
        .filter_map(|(time, price)| match (time.to_epoch(), price.to_decimal()) {
            (Some(epoch), Some(close)) => Some(Quote::tick(epoch, close)),
            _ => {
                tracing::debug!(?time, ?price, "Skipping malformed tick");
                None
            }
        })
        .collect()
}

fn format_candle(candle: &Candle) -> Option<Quote> {
    Some(Quote::candle(
        candle.epoch.to_epoch()?,
        candle.open.to_decimal()?,
        candle.high.to_decimal()?,
        candle.low.to_decimal()?,
        candle.close.to_decimal()?,
    ))
}

fn format_pushed_tick(tick: &Tick) -> Option<Quote> {
    let quote = Quote::tick(tick.epoch.to_epoch()?, tick.quote.to_decimal()?);
    Some(quote.with_raw(RawPayload::Tick(tick.clone())))
}

fn format_pushed_ohlc(ohlc: &Ohlc) -> Option<Quote> {
    let quote = Quote::candle(
        ohlc.open_time.to_epoch()?,
        ohlc.open.to_decimal()?,
        ohlc.high.to_decimal()?,
        ohlc.low.to_decimal()?,
        ohlc.close.to_decimal()?,
    );
    Some(quote.with_raw(RawPayload::Ohlc(ohlc.clone())))
}
