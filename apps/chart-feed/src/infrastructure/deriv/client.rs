//! Deriv WebSocket Client
//!
//! Connects to a Deriv-style API over WebSocket and implements
//! [`MarketDataApi`] on top of it.
//!
//! # Protocol
//!
//! Every request carries a `req_id`; the first frame echoing it resolves the
//! request. Subscribed `ticks_history` requests answer with a `subscription`
//! id, and later `tick`/`ohlc` frames carrying that id are routed to the
//! stream's channel.
//!
//! The connection state is published over a `watch` channel. When the
//! connection drops, in-flight requests fail and every stream channel closes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::codec::{self, ApiMessage, CodecError};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use crate::application::ports::{FeedError, LiveStream, MarketDataApi};
use crate::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::streaming::{
    ApiErrorBody, StreamMessage, TickHistoryRequest, TickHistoryResponse,
};
use crate::infrastructure::config::FeedConfig;
use crate::infrastructure::metrics;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the outbound frame queue.
const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum DerivClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No sign of life within the heartbeat timeout.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Deriv client.
#[derive(Debug, Clone)]
pub struct DerivClientConfig {
    /// WebSocket URL including the application id.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Buffer size of each stream channel.
    pub stream_buffer: usize,
}

impl DerivClientConfig {
    /// Create a configuration with default tunables.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig {
                max_attempts: 0,
                ..ReconnectConfig::default()
            },
            heartbeat: HeartbeatConfig::default(),
            stream_buffer: 256,
        }
    }

    /// Create configuration from the feed configuration.
    #[must_use]
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            url: config.api.endpoint(),
            reconnect: config.websocket.reconnect_config(),
            heartbeat: HeartbeatConfig::from_websocket_settings(&config.websocket),
            stream_buffer: config.api.stream_buffer.max(1),
        }
    }
}

// =============================================================================
// Request Bookkeeping
// =============================================================================

struct Reply {
    message: ApiMessage,
    updates: Option<mpsc::Receiver<StreamMessage>>,
}

struct PendingRequest {
    reply: oneshot::Sender<Result<Reply, FeedError>>,
    msg_type: &'static str,
    subscribe: bool,
    sent_at: Instant,
}

fn api_error(body: ApiErrorBody) -> FeedError {
    FeedError::Api {
        code: body.code,
        message: body.message,
    }
}

// =============================================================================
// Deriv Client
// =============================================================================

/// WebSocket client for the Deriv API.
///
/// Manages the connection lifecycle including:
/// - Request/response correlation
/// - Stream routing by subscription id
/// - Heartbeat monitoring
/// - Automatic reconnection with exponential backoff
pub struct DerivClient {
    config: DerivClientConfig,
    cancel: CancellationToken,
    next_req_id: AtomicU64,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    streams: Mutex<HashMap<String, mpsc::Sender<StreamMessage>>>,
    connection: watch::Sender<bool>,
}

impl DerivClient {
    /// Create a client. Nothing connects until [`run`](Self::run).
    #[must_use]
    pub fn new(config: DerivClientConfig, cancel: CancellationToken) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (connection, _) = watch::channel(false);
        Arc::new(Self {
            config,
            cancel,
            next_req_id: AtomicU64::new(1),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            pending: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            connection,
        })
    }

    /// Receiver of the connection state (`true` = connected).
    #[must_use]
    pub fn connection_state(&self) -> watch::Receiver<bool> {
        self.connection.subscribe()
    }

    /// Whether the connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connection.borrow()
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of routed streams.
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.streams.lock().len()
    }

    /// Run the connection loop until cancelled or out of reconnect attempts.
    ///
    /// # Errors
    ///
    /// Returns an error once the reconnect budget is spent.
    pub async fn run(self: Arc<Self>) -> Result<(), DerivClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                info!("API client cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    info!("API connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "API connection error");
                    metrics::record_websocket_error(error_type(&e));

                    let Some(delay) = policy.next_delay() else {
                        return Err(DerivClientError::MaxReconnectAttemptsExceeded);
                    };
                    metrics::record_reconnect();
                    info!(
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to API"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            info!("API client cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect and pump frames until error or cancellation.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), DerivClientError> {
        info!(url = %self.config.url, "Connecting to API");
        let (socket, _response) = tokio_tungstenite::connect_async(self.config.url.as_str()).await?;
        let (mut write, mut read) = socket.split();
        policy.reset();

        let mut outbound = self.outbound_rx.lock().await;
        while outbound.try_recv().is_ok() {}

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel.clone(),
            )
            .run(),
        );

        self.set_connected(true);
        info!("API connected");

        let result = self
            .pump(
                &mut write,
                &mut read,
                &mut outbound,
                &heartbeat_state,
                &mut heartbeat_rx,
            )
            .await;

        heartbeat_cancel.cancel();
        self.set_connected(false);
        self.fail_all("connection lost");
        result
    }

    async fn pump(
        &self,
        write: &mut SplitSink<Socket, Message>,
        read: &mut SplitStream<Socket>,
        outbound: &mut mpsc::Receiver<String>,
        heartbeat: &HeartbeatState,
        heartbeat_rx: &mut mpsc::Receiver<HeartbeatEvent>,
    ) -> Result<(), DerivClientError> {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                event = heartbeat_rx.recv() => match event {
                    Some(HeartbeatEvent::SendPing) => {
                        heartbeat.mark_ping_sent();
                        let frame = codec::encode_ping(self.next_req_id())?;
                        write.send(Message::Text(frame.into())).await?;
                    }
                    Some(HeartbeatEvent::Timeout) => return Err(DerivClientError::HeartbeatTimeout),
                    None => debug!("Heartbeat channel closed"),
                },
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        return Ok(());
                    };
                    trace!(%frame, "Sending frame");
                    write.send(Message::Text(frame.into())).await?;
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat.record_activity();
                        match codec::decode(&text) {
                            Ok(message) => self.route(message),
                            Err(e) => {
                                warn!(error = %e, "Dropping undecodable frame");
                                metrics::record_websocket_error("decode");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Pong(_))) => heartbeat.record_activity(),
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Server sent close frame");
                        return Err(DerivClientError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        info!("WebSocket stream ended");
                        return Err(DerivClientError::ConnectionClosed);
                    }
                },
            }
        }
    }

    fn next_req_id(&self) -> u64 {
        self.next_req_id.fetch_add(1, Ordering::Relaxed)
    }

    fn set_connected(&self, connected: bool) {
        self.connection.send_if_modified(|state| {
            let changed = *state != connected;
            *state = connected;
            changed
        });
        metrics::set_websocket_connected(connected);
    }

    /// Fail every in-flight request and close every stream.
    fn fail_all(&self, reason: &str) {
        let pending: Vec<_> = self.pending.lock().drain().map(|(_, p)| p).collect();
        let streams = self.streams.lock().drain().count();
        debug!(requests = pending.len(), streams, reason, "Failing in-flight work");

        for request in pending {
            let _ = request.reply.send(Err(FeedError::connection(reason)));
        }
    }

    /// Dispatch an inbound frame.
    fn route(&self, message: ApiMessage) {
        if message.is_push() {
            self.route_push(message);
            return;
        }

        let pending = message
            .req_id
            .and_then(|req_id| self.pending.lock().remove(&req_id));
        let Some(pending) = pending else {
            trace!(msg_type = %message.msg_type, "Ignoring unsolicited frame");
            return;
        };

        metrics::record_request_duration(pending.msg_type, pending.sent_at.elapsed());

        let stream_id = message
            .stream_id()
            .filter(|_| pending.subscribe && message.error.is_none())
            .map(str::to_string);
        let updates = stream_id.as_ref().map(|id| {
            let (tx, rx) = mpsc::channel(self.config.stream_buffer);
            self.streams.lock().insert(id.clone(), tx);
            rx
        });

        if pending.reply.send(Ok(Reply { message, updates })).is_err()
            && let Some(id) = stream_id
        {
            debug!(stream_id = %id, "Requester gone, releasing orphaned stream");
            self.streams.lock().remove(&id);
            self.release_detached(&id);
        }
    }

    fn route_push(&self, message: ApiMessage) {
        let Some(id) = message.stream_id().map(str::to_string) else {
            trace!("Ignoring push without subscription id");
            return;
        };

        let Some(sender) = self.streams.lock().get(&id).cloned() else {
            trace!(stream_id = %id, "Ignoring push for unknown stream");
            return;
        };

        match sender.try_send(message.into_stream_message()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(stream_id = %id, "Stream consumer lagging, dropping push");
                metrics::record_websocket_error("stream_full");
            }
            Err(TrySendError::Closed(_)) => {
                self.streams.lock().remove(&id);
            }
        }
    }

    /// Queue a `forget` nobody waits on.
    fn release_detached(&self, stream_id: &str) {
        match codec::encode_forget(stream_id, self.next_req_id()) {
            Ok(frame) => {
                if self.outbound_tx.try_send(frame).is_err() {
                    debug!(%stream_id, "Outbound queue unavailable, stream left to expire");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode forget"),
        }
    }

    async fn request<F>(
        &self,
        msg_type: &'static str,
        subscribe: bool,
        encode: F,
    ) -> Result<Reply, FeedError>
    where
        F: FnOnce(u64) -> Result<String, CodecError> + Send,
    {
        if !self.is_connected() {
            return Err(FeedError::connection("not connected"));
        }

        let req_id = self.next_req_id();
        let frame = encode(req_id).map_err(|e| FeedError::Decode {
            message: e.to_string(),
        })?;

        let (reply, receiver) = oneshot::channel();
        self.pending.lock().insert(
            req_id,
            PendingRequest {
                reply,
                msg_type,
                subscribe,
                sent_at: Instant::now(),
            },
        );

        if self.outbound_tx.send(frame).await.is_err() {
            self.pending.lock().remove(&req_id);
            return Err(FeedError::ChannelClosed);
        }

        receiver.await.map_err(|_| FeedError::ChannelClosed)?
    }
}

const fn error_type(error: &DerivClientError) -> &'static str {
    match error {
        DerivClientError::WebSocket(_) => "websocket",
        DerivClientError::Codec(_) => "codec",
        DerivClientError::HeartbeatTimeout => "heartbeat_timeout",
        DerivClientError::MaxReconnectAttemptsExceeded => "max_reconnects",
        DerivClientError::ConnectionClosed => "closed",
    }
}

#[async_trait]
impl MarketDataApi for DerivClient {
    async fn get_tick_history(
        &self,
        request: &TickHistoryRequest,
    ) -> Result<TickHistoryResponse, FeedError> {
        let reply = self
            .request("ticks_history", false, |req_id| {
                codec::encode_history(request, false, req_id)
            })
            .await?;
        Ok(reply.message.into_history_response())
    }

    async fn subscribe(&self, request: &TickHistoryRequest) -> Result<LiveStream, FeedError> {
        let reply = self
            .request("ticks_history", true, |req_id| {
                codec::encode_history(request, true, req_id)
            })
            .await?;

        let Reply { mut message, updates } = reply;
        if let Some(error) = message.error.take() {
            return Err(api_error(error));
        }

        let stream_id = message.stream_id().map(str::to_string);
        let updates = updates.ok_or_else(|| FeedError::Decode {
            message: "subscription response without stream id".to_string(),
        })?;

        Ok(LiveStream {
            history: message.into_history_response(),
            stream_id,
            updates,
        })
    }

    async fn forget(&self, stream_id: &str) -> Result<(), FeedError> {
        self.streams.lock().remove(stream_id);

        let reply = self
            .request("forget", false, |req_id| codec::encode_forget(stream_id, req_id))
            .await?;

        match reply.message.error {
            Some(error) => Err(api_error(error)),
            None => Ok(()),
        }
    }
}
