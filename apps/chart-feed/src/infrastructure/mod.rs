//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// In-memory chart data sets.
pub mod chart;

/// Wall and manual clocks.
pub mod clock;

/// Configuration from the environment.
pub mod config;

/// Deriv WebSocket API client.
pub mod deriv;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Log-backed user notifications.
pub mod notifier;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Fixed market status table.
pub mod trading_times;
