//! Tracing Notifier
//!
//! Writes user-facing notifications to the log.

use tracing::{error, info, warn};

use crate::application::ports::{Notification, NotificationKind, NotifierPort};

/// Notifier that logs every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotifierPort for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::FeedUnavailable { symbol_name } => {
                warn!(%symbol_name, "Streaming for this symbol is unavailable");
            }
            Notification::DelayedMarket {
                symbol_name,
                delay_minutes,
            } => info!(%symbol_name, delay_minutes, "Chart data is delayed"),
            Notification::MarketClosed { symbol_name } => {
                info!(%symbol_name, "Market is closed, showing past data");
            }
            Notification::Message {
                text,
                kind,
                category,
            } => match kind {
                NotificationKind::Info => info!(category = category.as_str(), "{text}"),
                NotificationKind::Warning => warn!(category = category.as_str(), "{text}"),
                NotificationKind::Error => error!(category = category.as_str(), "{text}"),
            },
        }
    }
}
