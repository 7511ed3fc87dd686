//! Notifier Port (Driven Port)
//!
//! User-facing notifications about market status and request failures.

use serde::{Deserialize, Serialize};

/// Severity of a message notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

/// Banner category a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationCategory {
    /// Problems with the active symbol.
    #[serde(rename = "activesymbol")]
    ActiveSymbol,
}

impl NotificationCategory {
    /// Get the category name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveSymbol => "activesymbol",
        }
    }
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The instrument has no data source.
    FeedUnavailable {
        /// Display name of the symbol.
        symbol_name: String,
    },
    /// The instrument streams with a publication delay.
    DelayedMarket {
        /// Display name of the symbol.
        symbol_name: String,
        /// Delay in minutes.
        delay_minutes: u32,
    },
    /// The market is closed; only past data is shown.
    MarketClosed {
        /// Display name of the symbol.
        symbol_name: String,
    },
    /// Free-form message, typically a server error.
    Message {
        /// Text shown to the user.
        text: String,
        /// Severity.
        kind: NotificationKind,
        /// Banner category.
        category: NotificationCategory,
    },
}

impl Notification {
    /// Error message about the active symbol.
    #[must_use]
    pub fn active_symbol_error(text: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            kind: NotificationKind::Error,
            category: NotificationCategory::ActiveSymbol,
        }
    }

    /// Short name used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FeedUnavailable { .. } => "feed_unavailable",
            Self::DelayedMarket { .. } => "delayed_market",
            Self::MarketClosed { .. } => "market_closed",
            Self::Message { .. } => "message",
        }
    }
}

/// Port for user-facing notifications.
pub trait NotifierPort: Send + Sync {
    /// Show a notification.
    fn notify(&self, notification: Notification);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_symbol_error_category() {
        let notification = Notification::active_symbol_error("InvalidSymbol");

        let Notification::Message { text, category, kind } = notification else {
            panic!("expected message");
        };
        assert_eq!(text, "InvalidSymbol");
        assert_eq!(kind, NotificationKind::Error);
        assert_eq!(category.as_str(), "activesymbol");
    }

    #[test]
    fn category_serializes_as_wire_name() {
        let json = serde_json::to_string(&NotificationCategory::ActiveSymbol).unwrap();
        assert_eq!(json, "\"activesymbol\"");
    }
}
