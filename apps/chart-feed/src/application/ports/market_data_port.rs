//! Market Data Port (Driven Port)
//!
//! Interface for the remote tick-history API: one-shot history requests and
//! push subscriptions that start with a history snapshot.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::streaming::{StreamMessage, TickHistoryRequest, TickHistoryResponse};

/// Market data error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The API answered with an error body.
    #[error("{message}")]
    Api {
        /// Machine-readable error code.
        code: String,
        /// Server message, shown to the user as-is.
        message: String,
    },

    /// Transport failure.
    #[error("Market data connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Response could not be decoded.
    #[error("Market data decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The push stream or the client task went away.
    #[error("Market data channel closed")]
    ChannelClosed,

    /// The request was superseded or the feed shut down.
    #[error("Request cancelled")]
    Cancelled,
}

impl FeedError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::ChannelClosed)
    }
}

/// Turn an error body into `Err`.
///
/// # Errors
///
/// Returns [`FeedError::Api`] when the response carries an error.
pub fn check_response(response: TickHistoryResponse) -> Result<TickHistoryResponse, FeedError> {
    match response.error {
        Some(error) => Err(FeedError::Api {
            code: error.code,
            message: error.message,
        }),
        None => Ok(response),
    }
}

/// An open push subscription.
#[derive(Debug)]
pub struct LiveStream {
    /// History snapshot returned with the subscription.
    pub history: TickHistoryResponse,
    /// Upstream stream id, used to release the stream.
    pub stream_id: Option<String>,
    /// Pushed ticks or OHLC updates; closes when the stream ends.
    pub updates: mpsc::Receiver<StreamMessage>,
}

/// Port for the remote market data API.
///
/// This is a driven (secondary/outbound) port. The infrastructure layer
/// provides the WebSocket implementation.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Fetch history for a bounded or open-ended range.
    async fn get_tick_history(
        &self,
        request: &TickHistoryRequest,
    ) -> Result<TickHistoryResponse, FeedError>;

    /// Fetch history and keep streaming new data.
    async fn subscribe(&self, request: &TickHistoryRequest) -> Result<LiveStream, FeedError>;

    /// Release an upstream stream.
    async fn forget(&self, stream_id: &str) -> Result<(), FeedError>;
}
