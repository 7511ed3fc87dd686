//! Chart Feed Binary
//!
//! Connects to the history API and streams one chart headlessly, logging
//! every update.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin chart-feed
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `CHART_FEED_WS_URL`: WebSocket endpoint (default: <wss://ws.derivws.com/websockets/v3>)
//! - `CHART_FEED_APP_ID`: Application id (default: 1089)
//! - `CHART_FEED_SYMBOL`: Symbol loaded on startup (default: `R_100`)
//! - `CHART_FEED_PERIOD` / `CHART_FEED_INTERVAL`: Chart periodicity (default: 1 tick)
//! - `CHART_FEED_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chart_feed::application::events::{FeedEvent, FeedEventKind};
use chart_feed::infrastructure::chart::{DEFAULT_MAX_TICKS, InMemoryChart};
use chart_feed::infrastructure::clock::SystemClock;
use chart_feed::infrastructure::notifier::TracingNotifier;
use chart_feed::infrastructure::telemetry;
use chart_feed::infrastructure::trading_times::StaticTradingTimes;
use chart_feed::{DerivClient, DerivClientConfig, Feed, FeedConfig, FeedPorts, init_metrics};
use chrono::Utc;
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Chart Feed");

    let config = FeedConfig::from_env()?;
    log_config(&config);

    if config.server.metrics_port != 0 {
        init_metrics(config.server.metrics_port).context("failed to install Prometheus exporter")?;
    }

    let shutdown_token = CancellationToken::new();

    let client = DerivClient::new(DerivClientConfig::from_config(&config), shutdown_token.clone());
    let mut connection = client.connection_state();

    let client_task = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            if let Err(e) = client.run().await {
                tracing::error!(error = %e, "API client error");
            }
        }
    });

    let symbol = config.feed.symbol.clone();
    let feed = Feed::new(
        FeedPorts {
            api: client,
            chart: Arc::new(InMemoryChart::new(symbol.clone())),
            notifier: Arc::new(TracingNotifier),
            trading_times: Arc::new(StaticTradingTimes::new().open(symbol.clone())),
            clock: Arc::new(SystemClock),
        },
        config.feed.feed_options(),
    );

    let _update_listener = feed.events().on(FeedEventKind::MasterDataUpdate, |event| {
        if let FeedEvent::MasterDataUpdate(update) = event {
            tracing::info!(
                epoch = update.quote.epoch,
                close = %update.quote.close,
                prev_close = ?update.prev_close,
                "Chart updated"
            );
        }
    });

    if !wait_for_connection(&mut connection, &shutdown_token).await {
        tracing::info!("Shut down before the API connected");
        return Ok(());
    }
    let _connection_watcher = feed.watch_connection(connection);

    let params = config.feed.params;
    let ticks = i64::try_from(DEFAULT_MAX_TICKS).unwrap_or(i64::MAX);
    let suggested_start = Utc::now() - chrono::Duration::seconds(params.granularity().step_secs() * ticks);
    let initial = feed
        .fetch_initial_data(&symbol, suggested_start, None, params)
        .await;
    match &initial.error {
        Some(error) => tracing::error!(%symbol, %error, "Initial load failed"),
        None => tracing::info!(%symbol, quotes = initial.quotes.len(), "Initial data loaded"),
    }

    tracing::info!("Chart feed ready");

    await_shutdown(shutdown_token).await;

    feed.shutdown();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, client_task).await.is_err() {
        tracing::warn!("API client did not stop in time");
    }

    tracing::info!("Chart feed stopped");
    Ok(())
}

/// Wait until the API connects. Returns `false` on shutdown.
async fn wait_for_connection(
    connection: &mut watch::Receiver<bool>,
    shutdown_token: &CancellationToken,
) -> bool {
    tokio::select! {
        () = shutdown_token.cancelled() => false,
        connected = connection.wait_for(|connected| *connected) => connected.is_ok(),
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        symbol = %config.feed.symbol,
        granularity = %config.feed.params.granularity(),
        metrics_port = config.server.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(endpoint = %config.api.endpoint(), "WebSocket endpoint");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
