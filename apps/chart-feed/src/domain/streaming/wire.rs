//! History API Wire Shapes
//!
//! Request and response types of the remote tick-history API. These map
//! directly to the JSON the API sends; the formatter converts them into
//! canonical [`Quote`](super::Quote) values.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"history": {"times": [1700000000, 1700000002], "prices": [100.1, "100.2"]}}
//! {"candles": [{"epoch": 1700000040, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5}]}
//! {"tick": {"epoch": 1700000004, "quote": 100.3, "symbol": "R_50"}}
//! {"ohlc": {"open_time": 1700000040, "open": "1.0", "high": "2.0", "low": "0.5", "close": "1.5"}}
//! {"error": {"code": "InvalidSymbol", "message": "Symbol R_0 is invalid."}}
//! ```

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subscription::{Granularity, SubscriptionKey};

// =============================================================================
// Numeric Coercion
// =============================================================================

/// A numeric field that the API may send either as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    /// Plain JSON number.
    Number(serde_json::Number),
    /// Number encoded as a string.
    Text(String),
}

impl Numeric {
    /// Coerce to a decimal price.
    #[must_use]
    pub fn to_decimal(&self) -> Option<Decimal> {
        let text = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        };

        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()
    }

    /// Coerce to an epoch in whole seconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_epoch(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
            }
        }
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for Numeric {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Decimal> for Numeric {
    fn from(value: Decimal) -> Self {
        Self::Text(value.to_string())
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Whether a history request asks for raw ticks or aggregated candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStyle {
    /// Raw ticks (granularity 0).
    Ticks,
    /// OHLC candles.
    Candles,
}

impl HistoryStyle {
    /// Get the style name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticks => "ticks",
            Self::Candles => "candles",
        }
    }
}

/// A tick-history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickHistoryRequest {
    /// Instrument symbol.
    pub symbol: String,
    /// Bucket size in seconds (0 = ticks).
    pub granularity: Granularity,
    /// First epoch requested.
    pub start: i64,
    /// Last epoch requested; `None` means "up to now".
    pub end: Option<i64>,
    /// Let the server move `start` back when it falls inside a closed session.
    pub adjust_start_time: bool,
}

impl TickHistoryRequest {
    /// Create a request running from `start` to now.
    #[must_use]
    pub fn new(symbol: impl Into<String>, granularity: Granularity, start: i64) -> Self {
        Self {
            symbol: symbol.into(),
            granularity,
            start,
            end: None,
            adjust_start_time: true,
        }
    }

    /// Pin the end of the requested range.
    #[must_use]
    pub const fn with_end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    /// Request used to continue a stream from `epoch` onward.
    ///
    /// The start is used as-is: continuity, not backfill, is the goal.
    #[must_use]
    pub fn continued_from(&self, epoch: i64) -> Self {
        Self {
            start: epoch,
            end: None,
            adjust_start_time: false,
            ..self.clone()
        }
    }

    /// Ticks or candles, depending on granularity.
    #[must_use]
    pub const fn style(&self) -> HistoryStyle {
        if self.granularity.is_tick() {
            HistoryStyle::Ticks
        } else {
            HistoryStyle::Candles
        }
    }

    /// Registry key for a subscription built from this request.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.symbol.clone(), self.granularity)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Error body returned by the API in place of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable error code.
    #[serde(default)]
    pub code: String,
    /// Human-readable message, shown to the user as-is.
    pub message: String,
}

/// Tick series as two parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// Epochs.
    #[serde(default)]
    pub times: Vec<Numeric>,
    /// Prices, parallel to `times`.
    #[serde(default)]
    pub prices: Vec<Numeric>,
}

/// One OHLC candle in a history response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open epoch.
    pub epoch: Numeric,
    /// Open price.
    pub open: Numeric,
    /// High price.
    pub high: Numeric,
    /// Low price.
    pub low: Numeric,
    /// Close price.
    pub close: Numeric,
}

/// Response to a tick-history request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickHistoryResponse {
    /// Tick data (granularity 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<History>,
    /// Candle data (granularity > 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candles: Option<Vec<Candle>>,
    /// Set when the request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

impl TickHistoryResponse {
    /// Response carrying tick history.
    #[must_use]
    pub const fn from_history(history: History) -> Self {
        Self {
            history: Some(history),
            candles: None,
            error: None,
        }
    }

    /// Response carrying candles.
    #[must_use]
    pub const fn from_candles(candles: Vec<Candle>) -> Self {
        Self {
            history: None,
            candles: Some(candles),
            error: None,
        }
    }

    /// Response carrying an API error.
    #[must_use]
    pub fn from_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            history: None,
            candles: None,
            error: Some(ApiErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

// =============================================================================
// Push Messages
// =============================================================================

/// A single pushed tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Tick epoch.
    pub epoch: Numeric,
    /// Tick price.
    pub quote: Numeric,
    /// Instrument symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Upstream stream id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A pushed OHLC update for the candle currently forming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    /// Candle open epoch.
    pub open_time: Numeric,
    /// Open price.
    pub open: Numeric,
    /// High price.
    pub high: Numeric,
    /// Low price.
    pub low: Numeric,
    /// Close price.
    pub close: Numeric,
    /// Epoch of the update itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<Numeric>,
    /// Candle size in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<u32>,
    /// Instrument symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Upstream stream id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A push event from a live stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Tick push (granularity 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<Tick>,
    /// OHLC push (granularity > 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ohlc: Option<Ohlc>,
}
