//! Clock Port (Driven Port)
//!
//! Source of server time, injected so reconnect timing is testable.

use chrono::{DateTime, Utc};

/// Server time source.
pub trait Clock: Send + Sync {
    /// Current server time.
    fn now(&self) -> DateTime<Utc>;

    /// Current server time as epoch seconds.
    fn epoch(&self) -> i64 {
        self.now().timestamp()
    }

    /// Clock name for logs.
    fn name(&self) -> &str {
        "clock"
    }
}

/// Shared clock reference.
pub type ServerTime = std::sync::Arc<dyn Clock>;
