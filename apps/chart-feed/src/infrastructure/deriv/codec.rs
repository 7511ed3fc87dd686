//! Deriv API Codec
//!
//! JSON encoding of outgoing requests and decoding of incoming frames.
//!
//! # Wire Format
//!
//! ```json
//! {"ticks_history": "R_50", "style": "candles", "granularity": 60, "start": 1700000000,
//!  "end": "latest", "adjust_start_time": 1, "subscribe": 1, "req_id": 7}
//! {"msg_type": "candles", "req_id": 7, "candles": [...], "subscription": {"id": "a1b2"}}
//! {"msg_type": "ohlc", "req_id": 7, "ohlc": {...}, "subscription": {"id": "a1b2"}}
//! {"forget": "a1b2", "req_id": 8}
//! {"ping": 1, "req_id": 9}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::streaming::{
    ApiErrorBody, Candle, History, HistoryStyle, Ohlc, StreamMessage, Tick, TickHistoryRequest,
    TickHistoryResponse,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is not a JSON object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

// =============================================================================
// Outgoing
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum HistoryEnd {
    Latest(&'static str),
    Epoch(i64),
}

#[derive(Debug, Serialize)]
struct TicksHistoryPayload<'a> {
    ticks_history: &'a str,
    style: HistoryStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    granularity: Option<u32>,
    start: i64,
    end: HistoryEnd,
    #[serde(skip_serializing_if = "Option::is_none")]
    adjust_start_time: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscribe: Option<u8>,
    req_id: u64,
}

#[derive(Debug, Serialize)]
struct ForgetPayload<'a> {
    forget: &'a str,
    req_id: u64,
}

#[derive(Debug, Serialize)]
struct PingPayload {
    ping: u8,
    req_id: u64,
}

/// Encode a `ticks_history` request.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_history(
    request: &TickHistoryRequest,
    subscribe: bool,
    req_id: u64,
) -> Result<String, CodecError> {
    let payload = TicksHistoryPayload {
        ticks_history: &request.symbol,
        style: request.style(),
        granularity: (!request.granularity.is_tick()).then(|| request.granularity.as_secs()),
        start: request.start,
        end: request.end.map_or(HistoryEnd::Latest("latest"), HistoryEnd::Epoch),
        adjust_start_time: request.adjust_start_time.then_some(1),
        subscribe: subscribe.then_some(1),
        req_id,
    };
    Ok(serde_json::to_string(&payload)?)
}

/// Encode a `forget` request for a stream id.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_forget(stream_id: &str, req_id: u64) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&ForgetPayload {
        forget: stream_id,
        req_id,
    })?)
}

/// Encode an application-level ping.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_ping(req_id: u64) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&PingPayload { ping: 1, req_id })?)
}

// =============================================================================
// Incoming
// =============================================================================

/// Subscription info attached to streamed responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionInfo {
    /// Upstream stream id.
    pub id: String,
}

/// A decoded API frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiMessage {
    /// Message type (`history`, `candles`, `tick`, `ohlc`, `forget`, `ping`, ...).
    #[serde(default)]
    pub msg_type: String,
    /// Id of the request this frame answers.
    #[serde(default)]
    pub req_id: Option<u64>,
    /// Error body, set instead of data.
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    /// Stream this frame belongs to.
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
    /// Tick history.
    #[serde(default)]
    pub history: Option<History>,
    /// Candle history.
    #[serde(default)]
    pub candles: Option<Vec<Candle>>,
    /// Tick push.
    #[serde(default)]
    pub tick: Option<Tick>,
    /// OHLC push.
    #[serde(default)]
    pub ohlc: Option<Ohlc>,
}

impl ApiMessage {
    /// Whether this frame is a tick or OHLC push.
    #[must_use]
    pub const fn is_push(&self) -> bool {
        self.tick.is_some() || self.ohlc.is_some()
    }

    /// Id of the stream this frame belongs to.
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.id.as_str())
    }

    /// History payload of this frame.
    #[must_use]
    pub fn into_history_response(self) -> TickHistoryResponse {
        TickHistoryResponse {
            history: self.history,
            candles: self.candles,
            error: self.error,
        }
    }

    /// Push payload of this frame.
    #[must_use]
    pub fn into_stream_message(self) -> StreamMessage {
        StreamMessage {
            tick: self.tick,
            ohlc: self.ohlc,
        }
    }
}

/// Decode a text frame.
///
/// # Errors
///
/// Returns an error if the frame is not a JSON object of the expected shape.
pub fn decode(text: &str) -> Result<ApiMessage, CodecError> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        let preview: String = trimmed.chars().take(50).collect();
        return Err(CodecError::InvalidFormat(format!(
            "expected JSON object, got: {preview}..."
        )));
    }
    Ok(serde_json::from_str(trimmed)?)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::domain::subscription::Granularity;

    fn parse(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn encodes_open_candle_subscription() {
        let request = TickHistoryRequest::new("R_50", Granularity::from_secs(60), 1_700_000_000);

        let encoded = parse(&encode_history(&request, true, 7).unwrap());

        assert_eq!(
            encoded,
            json!({
                "ticks_history": "R_50",
                "style": "candles",
                "granularity": 60,
                "start": 1_700_000_000,
                "end": "latest",
                "adjust_start_time": 1,
                "subscribe": 1,
                "req_id": 7
            })
        );
    }

    #[test]
    fn encodes_bounded_tick_history_without_adjustment() {
        let request = TickHistoryRequest::new("R_50", Granularity::TICK, 100)
            .with_end(200)
            .continued_from(150)
            .with_end(200);

        let encoded = parse(&encode_history(&request, false, 1).unwrap());

        assert_eq!(encoded["style"], "ticks");
        assert_eq!(encoded["end"], 200);
        assert!(encoded.get("granularity").is_none());
        assert!(encoded.get("adjust_start_time").is_none());
        assert!(encoded.get("subscribe").is_none());
    }

    #[test]
    fn encodes_forget_and_ping() {
        assert_eq!(parse(&encode_forget("abc", 3).unwrap()), json!({"forget": "abc", "req_id": 3}));
        assert_eq!(parse(&encode_ping(4).unwrap()), json!({"ping": 1, "req_id": 4}));
    }

    #[test]
    fn decodes_candles_with_subscription() {
        let frame = r#"{"msg_type": "candles", "req_id": 7,
            "candles": [{"epoch": 60, "open": 1, "high": 2, "low": 0.5, "close": 1.5}],
            "subscription": {"id": "a1b2"}}"#;

        let message = decode(frame).unwrap();

        assert_eq!(message.req_id, Some(7));
        assert_eq!(message.stream_id(), Some("a1b2"));
        assert!(!message.is_push());
        assert_eq!(message.into_history_response().candles.unwrap().len(), 1);
    }

    #[test]
    fn decodes_tick_push() {
        let frame = r#"{"msg_type": "tick", "tick": {"epoch": 1700000004, "quote": 100.3,
            "symbol": "R_50", "id": "t1"}, "subscription": {"id": "t1"}}"#;

        let message = decode(frame).unwrap();

        assert!(message.is_push());
        assert!(message.into_stream_message().tick.is_some());
    }

    #[test]
    fn decodes_error_frame() {
        let frame = r#"{"msg_type": "ticks_history", "req_id": 2,
            "error": {"code": "InvalidSymbol", "message": "Symbol R_0 is invalid."}}"#;

        let message = decode(frame).unwrap();

        assert_eq!(message.error.unwrap().code, "InvalidSymbol");
    }

    #[test]
    fn rejects_non_object_frames() {
        assert!(matches!(decode("[1, 2]"), Err(CodecError::InvalidFormat(_))));
        assert!(matches!(decode("{not json"), Err(CodecError::Json(_))));
    }
}
