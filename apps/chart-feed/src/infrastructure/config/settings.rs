//! Feed Configuration Settings
//!
//! Configuration types for the chart feed, loaded from environment variables.

use std::time::Duration;

use crate::application::events::DEFAULT_EVENT_CAPACITY;
use crate::application::services::feed::{
    DEFAULT_MAX_PAGINATION_ROUNDS, DEFAULT_RETENTION_HORIZON_SECS, FeedOptions,
};
use crate::application::services::reconnect::ReconnectConfig;
use crate::application::services::subscription::{DEFAULT_POLL_INTERVAL, SubscriptionOptions};
use crate::domain::subscription::{ChartInterval, ChartParams};

/// Remote API settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// WebSocket endpoint, without query string.
    pub url: String,
    /// Application id sent with every connection.
    pub app_id: String,
    /// Buffer size of each push stream.
    pub stream_buffer: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: "wss://ws.derivws.com/websockets/v3".to_string(),
            app_id: "1089".to_string(),
            stream_buffer: 256,
        }
    }
}

impl ApiSettings {
    /// Full WebSocket URL including the application id.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}?app_id={}", self.url, self.app_id)
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

impl WebSocketSettings {
    /// Backoff used for transport reconnects.
    #[must_use]
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: self.reconnect_delay_initial,
            max_delay: self.reconnect_delay_max,
            multiplier: self.reconnect_delay_multiplier,
            max_attempts: self.max_reconnect_attempts,
            ..ReconnectConfig::default()
        }
    }
}

/// Feed behavior settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Symbol loaded on startup.
    pub symbol: String,
    /// Periodicity of the startup chart.
    pub params: ChartParams,
    /// Poll interval of delayed subscriptions.
    pub delayed_poll_interval: Duration,
    /// Oldest data the history API serves, in seconds before now.
    pub retention_horizon_secs: i64,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Backoff for live resubscribes.
    pub resubscribe: ReconnectConfig,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            symbol: "R_100".to_string(),
            params: ChartParams::ticks(),
            delayed_poll_interval: DEFAULT_POLL_INTERVAL,
            retention_horizon_secs: DEFAULT_RETENTION_HORIZON_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            resubscribe: ReconnectConfig::default(),
        }
    }
}

impl FeedSettings {
    /// Options for building a [`Feed`](crate::application::services::feed::Feed).
    #[must_use]
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            subscription: SubscriptionOptions {
                poll_interval: self.delayed_poll_interval,
                resubscribe: self.resubscribe.clone(),
            },
            retention_horizon_secs: self.retention_horizon_secs,
            max_pagination_rounds: DEFAULT_MAX_PAGINATION_ROUNDS,
            event_capacity: self.event_capacity,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { metrics_port: 9090 }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone, Default)]
pub struct FeedConfig {
    /// Remote API settings.
    pub api: ApiSettings,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Feed behavior settings.
    pub feed: FeedSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// Every variable is optional; unset variables fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_defaults = ApiSettings::default();
        let api = ApiSettings {
            url: non_empty_env("CHART_FEED_WS_URL")?.unwrap_or(api_defaults.url),
            app_id: non_empty_env("CHART_FEED_APP_ID")?.unwrap_or(api_defaults.app_id),
            stream_buffer: parse_env_usize("CHART_FEED_STREAM_BUFFER", api_defaults.stream_buffer),
        };

        let ws_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            heartbeat_interval: parse_env_duration_secs(
                "CHART_FEED_HEARTBEAT_INTERVAL_SECS",
                ws_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "CHART_FEED_HEARTBEAT_TIMEOUT_SECS",
                ws_defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "CHART_FEED_RECONNECT_DELAY_INITIAL_MS",
                ws_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "CHART_FEED_RECONNECT_DELAY_MAX_SECS",
                ws_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "CHART_FEED_RECONNECT_DELAY_MULTIPLIER",
                ws_defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "CHART_FEED_MAX_RECONNECT_ATTEMPTS",
                ws_defaults.max_reconnect_attempts,
            ),
        };

        let feed_defaults = FeedSettings::default();
        let interval = match non_empty_env("CHART_FEED_INTERVAL")? {
            Some(value) => ChartInterval::parse(&value).ok_or(ConfigError::InvalidValue {
                key: "CHART_FEED_INTERVAL".to_string(),
                value,
            })?,
            None => feed_defaults.params.interval,
        };
        let resubscribe_defaults = feed_defaults.resubscribe.clone();
        let feed = FeedSettings {
            symbol: non_empty_env("CHART_FEED_SYMBOL")?.unwrap_or(feed_defaults.symbol),
            params: ChartParams::new(
                parse_env_u32("CHART_FEED_PERIOD", feed_defaults.params.period),
                interval,
            ),
            delayed_poll_interval: parse_env_duration_millis(
                "CHART_FEED_DELAYED_POLL_INTERVAL_MS",
                feed_defaults.delayed_poll_interval,
            ),
            retention_horizon_secs: parse_env_i64(
                "CHART_FEED_RETENTION_HORIZON_SECS",
                feed_defaults.retention_horizon_secs,
            ),
            event_capacity: parse_env_usize("CHART_FEED_EVENT_CAPACITY", feed_defaults.event_capacity)
                .max(1),
            resubscribe: ReconnectConfig {
                initial_delay: parse_env_duration_millis(
                    "CHART_FEED_RESUBSCRIBE_DELAY_INITIAL_MS",
                    resubscribe_defaults.initial_delay,
                ),
                max_delay: parse_env_duration_secs(
                    "CHART_FEED_RESUBSCRIBE_DELAY_MAX_SECS",
                    resubscribe_defaults.max_delay,
                ),
                max_attempts: parse_env_u32(
                    "CHART_FEED_RESUBSCRIBE_MAX_ATTEMPTS",
                    resubscribe_defaults.max_attempts,
                ),
                ..resubscribe_defaults
            },
        };

        let server = ServerSettings {
            metrics_port: parse_env_u16(
                "CHART_FEED_METRICS_PORT",
                ServerSettings::default().metrics_port,
            ),
        };

        Ok(Self {
            api,
            websocket,
            feed,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn non_empty_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(None),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    parse_env(key, default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    parse_env(key, default)
}

fn parse_env_i64(key: &str, default: i64) -> i64 {
    parse_env(key, default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    parse_env(key, default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    parse_env(key, default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
