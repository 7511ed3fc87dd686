//! Clocks
//!
//! [`SystemClock`] reads the host clock; [`ManualClock`] only moves when told
//! to and drives reconnect timing in tests.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::application::ports::Clock;

/// Host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// Clock that stands still until advanced.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock at a point in time.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Create a clock at epoch seconds. Out-of-range values start at the
    /// Unix epoch.
    #[must_use]
    pub fn at_epoch(epoch: i64) -> Self {
        Self::new(DateTime::from_timestamp(epoch, 0).unwrap_or_default())
    }

    /// Move the clock forward.
    pub fn advance_secs(&self, secs: i64) {
        *self.now.lock() += Duration::seconds(secs);
    }

    /// Jump to a point in time.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn name(&self) -> &str {
        "manual"
    }
}
