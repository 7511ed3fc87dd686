//! Feed Event Channel
//!
//! Typed publish/subscribe used by the feed to tell consumers about data
//! updates, reinitialization and pagination progress.
//!
//! # Architecture
//!
//! The `FeedEventHub` offers two ways to listen:
//! - Synchronous callbacks per event kind, registered with [`FeedEventHub::on`]
//!   and removed through the returned [`ListenerHandle`]
//! - A tokio broadcast channel carrying every event, for async consumers
//!
//! Callbacks run inline on the emitting task, before the broadcast send.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::streaming::DataUpdate;

// =============================================================================
// Events
// =============================================================================

/// An event emitted by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    /// New data was appended to the main series.
    MasterDataUpdate(DataUpdate),
    /// The main series was loaded from scratch.
    MasterDataReinitialize,
    /// New data was appended to a comparison series.
    ComparisonDataUpdate {
        /// Comparison symbol.
        symbol: String,
        /// The update.
        update: DataUpdate,
    },
    /// A pagination request for the main series started.
    PaginationStart {
        /// Requested start epoch.
        start: i64,
        /// Requested end epoch.
        end: i64,
    },
    /// A pagination request for the main series completed.
    PaginationProgress {
        /// Requested start epoch.
        start: i64,
        /// End epoch actually covered.
        end: i64,
    },
}

impl FeedEvent {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> FeedEventKind {
        match self {
            Self::MasterDataUpdate(_) => FeedEventKind::MasterDataUpdate,
            Self::MasterDataReinitialize => FeedEventKind::MasterDataReinitialize,
            Self::ComparisonDataUpdate { .. } => FeedEventKind::ComparisonDataUpdate,
            Self::PaginationStart { .. } => FeedEventKind::PaginationStart,
            Self::PaginationProgress { .. } => FeedEventKind::PaginationProgress,
        }
    }
}

/// Discriminant of [`FeedEvent`], used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEventKind {
    /// See [`FeedEvent::MasterDataUpdate`].
    MasterDataUpdate,
    /// See [`FeedEvent::MasterDataReinitialize`].
    MasterDataReinitialize,
    /// See [`FeedEvent::ComparisonDataUpdate`].
    ComparisonDataUpdate,
    /// See [`FeedEvent::PaginationStart`].
    PaginationStart,
    /// See [`FeedEvent::PaginationProgress`].
    PaginationProgress,
}

impl FeedEventKind {
    /// Get the event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MasterDataUpdate => "master_data_update",
            Self::MasterDataReinitialize => "master_data_reinitialize",
            Self::ComparisonDataUpdate => "comparison_data_update",
            Self::PaginationStart => "pagination_start",
            Self::PaginationProgress => "pagination_progress",
        }
    }
}

// =============================================================================
// Listeners
// =============================================================================

type Listener = Arc<dyn Fn(&FeedEvent) + Send + Sync>;

struct ListenerTable {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, FeedEventKind, Listener)>>,
}

impl ListenerTable {
    fn remove(&self, id: u64) {
        self.entries.write().retain(|(entry_id, _, _)| *entry_id != id);
    }
}

/// Disposer for a registered listener.
///
/// The listener is removed on [`dispose`](Self::dispose) or when the handle is
/// dropped. Use [`detach`](Self::detach) to keep it for the hub's lifetime.
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    id: u64,
    table: Weak<ListenerTable>,
    active: bool,
}

impl ListenerHandle {
    /// Remove the listener.
    pub fn dispose(mut self) {
        self.release();
    }

    /// Keep the listener registered after the handle is dropped.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(table) = self.table.upgrade() {
            table.remove(self.id);
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

// =============================================================================
// Event Hub
// =============================================================================

/// Default capacity of the broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// Central hub for feed events.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use chart_feed::application::events::{FeedEvent, FeedEventHub, FeedEventKind};
///
/// let hub = FeedEventHub::new(16);
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&seen);
/// let handle = hub.on(FeedEventKind::MasterDataReinitialize, move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// hub.emit(FeedEvent::MasterDataReinitialize);
/// handle.dispose();
/// hub.emit(FeedEvent::MasterDataReinitialize);
///
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct FeedEventHub {
    listeners: Arc<ListenerTable>,
    tx: broadcast::Sender<FeedEvent>,
}

impl FeedEventHub {
    /// Create a hub whose broadcast channel holds `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Arc::new(ListenerTable {
                next_id: AtomicU64::new(1),
                entries: RwLock::new(Vec::new()),
            }),
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Create a hub with the default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }

    /// Register a callback for one event kind.
    pub fn on<F>(&self, kind: FeedEventKind, listener: F) -> ListenerHandle
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entries
            .write()
            .push((id, kind, Arc::new(listener)));

        ListenerHandle {
            id,
            table: Arc::downgrade(&self.listeners),
            active: true,
        }
    }

    /// Deliver an event to its listeners and to broadcast receivers.
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, event: FeedEvent) -> usize {
        let kind = event.kind();
        let matching: Vec<Listener> = self
            .listeners
            .entries
            .read()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        for listener in &matching {
            listener(&event);
        }

        tracing::trace!(event = kind.as_str(), listeners = matching.len(), "Feed event emitted");
        // No receivers is not an error
        let _ = self.tx.send(event);
        matching.len()
    }

    /// Get a new receiver for all events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Get all events as a stream.
    #[must_use]
    pub fn stream(&self) -> BroadcastStream<FeedEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Get statistics about the hub.
    #[must_use]
    pub fn stats(&self) -> EventHubStats {
        EventHubStats {
            listeners: self.listeners.entries.read().len(),
            receivers: self.tx.receiver_count(),
        }
    }
}

impl Default for FeedEventHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for FeedEventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedEventHub")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about the event hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventHubStats {
    /// Registered callbacks.
    pub listeners: usize,
    /// Live broadcast receivers.
    pub receivers: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rust_decimal::Decimal;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::domain::streaming::Quote;

    fn update(epoch: i64) -> DataUpdate {
        DataUpdate {
            quote: Quote::tick(epoch, Decimal::ONE),
            prev_close: None,
        }
    }

    fn counting(hub: &FeedEventHub, kind: FeedEventKind) -> (ListenerHandle, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handle = hub.on(kind, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (handle, count)
    }

    #[test]
    fn listeners_receive_only_their_kind() {
        let hub = FeedEventHub::with_defaults();
        let (_update, updates) = counting(&hub, FeedEventKind::MasterDataUpdate);
        let (_start, starts) = counting(&hub, FeedEventKind::PaginationStart);

        hub.emit(FeedEvent::MasterDataUpdate(update(1)));
        hub.emit(FeedEvent::MasterDataUpdate(update(2)));
        hub.emit(FeedEvent::PaginationStart { start: 0, end: 10 });

        assert_eq!(updates.load(Ordering::SeqCst), 2);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_removes_listener() {
        let hub = FeedEventHub::with_defaults();
        let (handle, count) = counting(&hub, FeedEventKind::MasterDataReinitialize);

        handle.dispose();
        let delivered = hub.emit(FeedEvent::MasterDataReinitialize);

        assert_eq!(delivered, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(hub.stats().listeners, 0);
    }

    #[test]
    fn drop_removes_listener() {
        let hub = FeedEventHub::with_defaults();
        {
            let (_handle, _count) = counting(&hub, FeedEventKind::MasterDataReinitialize);
            assert_eq!(hub.stats().listeners, 1);
        }

        assert_eq!(hub.stats().listeners, 0);
    }

    #[test]
    fn detach_keeps_listener() {
        let hub = FeedEventHub::with_defaults();
        let (handle, count) = counting(&hub, FeedEventKind::MasterDataReinitialize);

        handle.detach();
        hub.emit(FeedEvent::MasterDataReinitialize);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_closure_registered_twice_is_two_listeners() {
        let hub = FeedEventHub::with_defaults();
        let (first, count) = counting(&hub, FeedEventKind::PaginationProgress);
        let c = Arc::clone(&count);
        let second = hub.on(FeedEventKind::PaginationProgress, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        first.dispose();
        hub.emit(FeedEvent::PaginationProgress { start: 0, end: 1 });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        second.dispose();
    }

    #[test]
    fn handle_outliving_hub_is_harmless() {
        let hub = FeedEventHub::with_defaults();
        let (handle, _count) = counting(&hub, FeedEventKind::MasterDataUpdate);
        drop(hub);
        handle.dispose();
    }

    #[tokio::test]
    async fn broadcast_receivers_get_every_event() {
        let hub = FeedEventHub::new(8);
        let mut rx = hub.subscribe();

        hub.emit(FeedEvent::ComparisonDataUpdate {
            symbol: "R_100".to_string(),
            update: update(5),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), FeedEventKind::ComparisonDataUpdate);
    }

    #[tokio::test]
    async fn stream_yields_events() {
        let hub = FeedEventHub::new(8);
        let mut stream = hub.stream();

        hub.emit(FeedEvent::PaginationStart { start: 1, end: 2 });

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event, FeedEvent::PaginationStart { start: 1, end: 2 });
    }

    #[test]
    fn emit_without_receivers_is_fine() {
        let hub = FeedEventHub::with_defaults();
        assert_eq!(hub.emit(FeedEvent::MasterDataReinitialize), 0);
        assert_eq!(hub.stats().receivers, 0);
    }
}
