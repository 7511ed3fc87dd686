//! Configuration Module
//!
//! Configuration loading for the chart feed service.

mod settings;

pub use settings::{
    ApiSettings, ConfigError, FeedConfig, FeedSettings, ServerSettings, WebSocketSettings,
};
