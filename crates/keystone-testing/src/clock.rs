//! Manually driven clock for lease-expiry and settlement tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use keystone_core::clock::Clock;

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can keep one handle and advance
/// time under a dispatcher or repository that owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// A fixed, whole-second starting instant (2026-03-01T00:00:00Z).
    pub fn epoch() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
