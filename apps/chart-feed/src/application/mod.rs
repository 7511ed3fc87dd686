//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the feed and its subscriptions, the event channel
//! consumers listen on, and the port interfaces that define how the feed
//! interacts with the API, the chart and the user.

/// Typed feed events and their listener hub.
pub mod events;

/// Port interfaces for external systems (market data API, chart, notifier).
pub mod ports;

/// Application services: feed, subscriptions and reconnect policy.
pub mod services;
