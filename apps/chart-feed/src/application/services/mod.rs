//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Feed`: Initial loads, pagination and the streaming append path
//! - `Subscription`: Live and delayed per-key streaming state
//! - `ReconnectPolicy`: Exponential backoff for resubscribes and reconnects

pub mod feed;
pub mod reconnect;
pub mod subscription;

pub use feed::{Feed, FeedOptions, FeedPorts, InitialData, PaginationData};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use subscription::{
    DelayedSubscription, LiveSubscription, Subscription, SubscriptionOptions,
};
