//! Wall-clock and monotonic time sources.
//!
//! Tracing events are recorded with monotonic nanos and only converted to
//! wall-clock [`Timestamp`]s when a span is snapshotted, so that events
//! within one trace stay ordered even if the system clock is adjusted. The
//! [`TimestampConverter`] captures one `(wall, monotonic)` anchor per trace
//! and performs that conversion.

use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// A point in time with nanosecond precision, as seconds and nanos since the
/// Unix epoch.
///
/// Always normalized: `0 <= nanos < 1_000_000_000`, so the derived ordering
/// is the chronological one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
    nanos: i32,
}

impl Timestamp {
    /// Create a timestamp from seconds and nanos since the epoch.
    ///
    /// The value is normalized, so `nanos` outside `[0, 1e9)` carry into the
    /// seconds part.
    pub fn new(seconds: i64, nanos: i64) -> Self {
        Timestamp::from_nanos(seconds as i128 * NANOS_PER_SECOND + nanos as i128)
    }

    /// Create a timestamp from total nanos since the epoch.
    pub fn from_nanos(total_nanos: i128) -> Self {
        Timestamp {
            seconds: total_nanos.div_euclid(NANOS_PER_SECOND) as i64,
            nanos: total_nanos.rem_euclid(NANOS_PER_SECOND) as i32,
        }
    }

    /// Seconds since the epoch.
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Nanosecond part, always in `[0, 1e9)`.
    pub fn nanos(&self) -> i32 {
        self.nanos
    }

    /// Total nanos since the epoch.
    pub fn total_nanos(&self) -> i128 {
        self.seconds as i128 * NANOS_PER_SECOND + self.nanos as i128
    }

    /// This timestamp moved forwards by `duration`.
    pub fn add_duration(&self, duration: Duration) -> Self {
        Timestamp::from_nanos(self.total_nanos() + duration.as_nanos() as i128)
    }

    /// This timestamp moved backwards by `duration`.
    pub fn sub_duration(&self, duration: Duration) -> Self {
        Timestamp::from_nanos(self.total_nanos() - duration.as_nanos() as i128)
    }

    /// This timestamp moved by a signed number of nanos.
    pub fn add_nanos(&self, nanos: i64) -> Self {
        Timestamp::from_nanos(self.total_nanos() + nanos as i128)
    }

    /// The duration from `earlier` to `self`, or `None` if `earlier` is
    /// after `self`.
    pub fn duration_since(&self, earlier: &Timestamp) -> Option<Duration> {
        let diff = self.total_nanos() - earlier.total_nanos();
        if diff < 0 {
            None
        } else {
            Some(Duration::from_nanos(diff as u64))
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since_epoch) => Timestamp::from_nanos(since_epoch.as_nanos() as i128),
            Err(err) => Timestamp::from_nanos(-(err.duration().as_nanos() as i128)),
        }
    }
}

/// Provider of the wall-clock time and a monotonic nano counter.
///
/// `now_nanos` readings are only comparable to other readings from the same
/// clock; they are anchored to wall time via a [`TimestampConverter`].
pub trait Clock: fmt::Debug + Send + Sync {
    /// The current wall-clock time.
    fn now(&self) -> Timestamp;

    /// A monotonic nano counter, unaffected by wall-clock adjustments.
    fn now_nanos(&self) -> i64;
}

// Shared origin for monotonic readings so values from different SystemClock
// instances compare against the same zero.
static MONOTONIC_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// [`Clock`] backed by the operating system.
#[derive(Clone, Debug, Default)]
pub struct SystemClock {
    _private: (),
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        SystemClock::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from(SystemTime::now())
    }

    fn now_nanos(&self) -> i64 {
        MONOTONIC_ORIGIN.elapsed().as_nanos() as i64
    }
}

/// Converts monotonic nano readings into wall-clock [`Timestamp`]s using an
/// anchor captured at construction time.
///
/// A root span creates one converter and all descendant spans reuse it, so
/// every event in the trace is placed on a single consistent timeline.
#[derive(Clone, Debug)]
pub struct TimestampConverter {
    timestamp: Timestamp,
    nanos: i64,
}

impl TimestampConverter {
    /// Capture a `(wall, monotonic)` anchor from `clock`.
    pub fn now(clock: &dyn Clock) -> Self {
        TimestampConverter {
            timestamp: clock.now(),
            nanos: clock.now_nanos(),
        }
    }

    /// Convert a monotonic reading from the anchored clock to a wall-clock
    /// timestamp.
    pub fn convert_nano_time(&self, nano_time: i64) -> Timestamp {
        self.timestamp.add_nanos(nano_time - self.nanos)
    }
}
