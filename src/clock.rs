//! Time source for registration windows and record timestamps.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Abstracts "now" so registration windows can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use seminarfold::clock::{Clock, FixedClock};
///
/// let clock = FixedClock::new(Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap());
/// clock.set(Utc.with_ymd_and_hms(2020, 1, 2, 8, 0, 0).unwrap());
/// assert_eq!(clock.now(), Utc.with_ymd_and_hms(2020, 1, 2, 8, 0, 0).unwrap());
/// ```
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        FixedClock {
            time: Mutex::new(time),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        match self.time.lock() {
            Ok(mut guard) => *guard = time,
            Err(poisoned) => *poisoned.into_inner() = time,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.time.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
