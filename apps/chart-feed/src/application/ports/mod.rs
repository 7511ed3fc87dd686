//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataApi`: Remote tick-history and streaming API
//! - `ChartPort`: The chart rendering engine
//! - `NotifierPort`: User-facing notifications
//! - `TradingTimesPort`: Market status per symbol
//! - `Clock`: Server time source

mod chart_port;
mod clock_port;
mod market_data_port;
mod notifier_port;
mod trading_times_port;

pub use chart_port::{ChartPort, UpdateMode};
pub use clock_port::{Clock, ServerTime};
pub use market_data_port::{FeedError, LiveStream, MarketDataApi, check_response};
pub use notifier_port::{Notification, NotificationCategory, NotificationKind, NotifierPort};
pub use trading_times_port::TradingTimesPort;
