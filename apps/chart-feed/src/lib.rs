#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Chart Feed - Market Data Feed and Subscription Engine
//!
//! Turns a `(symbol, granularity)` request into a continuous quote series for
//! a chart renderer: initial history, backward pagination, live and delayed
//! streaming, and pause/resume around connection loss.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Quotes, wire shapes and pure rules
//!   - `streaming`: Quote type, API wire shapes, formatter
//!   - `subscription`: Granularity, keys, lifecycle states, registry
//!   - `window`: Pinned range window, trimming, splicing
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Market data API, chart, notifier, trading times, clock
//!   - `events`: Feed event hub
//!   - `services`: Feed, live and delayed subscriptions, backoff
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `deriv`: WebSocket client for the history API
//!   - `chart`: In-memory chart data sets
//!   - `config`: Configuration from the environment
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                ┌────────────┐  history   ┌──────┐  quotes   ┌───────┐
//! Deriv WS API ◄─┤ DerivClient├──────────► │ Feed ├─────────► │ Chart │
//!                └─────┬──────┘  pushes    └──┬───┘           └───────┘
//!                      │ connection state     │ events
//!                      └──────────────────────┴──────────► listeners
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Quotes, subscriptions and range rules.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{DataUpdate, Quote, TickHistoryRequest, TickHistoryResponse};
pub use domain::subscription::{
    ChartInterval, ChartParams, Granularity, SubscriptionKey, SubscriptionRegistry,
    SubscriptionState,
};
pub use domain::window::RangeWindow;

// Application services
pub use application::events::{FeedEvent, FeedEventHub, FeedEventKind};
pub use application::ports::{ChartPort, FeedError, MarketDataApi, Notification, NotifierPort};
pub use application::services::{Feed, FeedOptions, FeedPorts, InitialData, PaginationData};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedConfig};

// API client
pub use infrastructure::deriv::{DerivClient, DerivClientConfig, DerivClientError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
