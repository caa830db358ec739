//! Utilities for testing instrumented code.

use std::sync::Mutex;
use std::time::Duration;

use crate::time::{Clock, Timestamp};

/// A [`Clock`] whose time only moves when told to.
///
/// The monotonic reading is derived from the wall-clock time, so advancing
/// the clock by a duration advances span latencies by exactly that amount.
#[derive(Debug)]
pub struct TestClock {
    time: Mutex<Timestamp>,
}

impl TestClock {
    /// Create a clock frozen at `time`.
    pub fn new(time: Timestamp) -> Self {
        TestClock {
            time: Mutex::new(time),
        }
    }

    /// Move the clock forwards by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut time = self.time.lock().unwrap();
        *time = time.add_duration(duration);
    }

    /// Set the clock to an absolute time.
    pub fn set_time(&self, time: Timestamp) {
        *self.time.lock().unwrap() = time;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        *self.time.lock().unwrap()
    }

    fn now_nanos(&self) -> i64 {
        self.now().total_nanos() as i64
    }
}
