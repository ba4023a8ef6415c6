//! Time abstractions
//!
//! The RPC layer never reads the system clock on its own. Deadlines and
//! `createdAt` stamps come from a [`Clock`], so tests can drive time by hand
//! and a simulated clock can stand in for the real one.

use core::ops::Add;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in time
///
/// Opaque nanoseconds since the Unix epoch. A simulated clock may start
/// anywhere; only differences between instants matter for deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instant {
    nanos: u64,
}

impl Instant {
    /// Creates an instant from nanoseconds
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Creates an instant from milliseconds
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis * 1_000_000,
        }
    }

    /// Returns nanoseconds since epoch
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Returns milliseconds since epoch
    pub const fn as_millis(&self) -> u64 {
        self.nanos / 1_000_000
    }

    /// Returns the duration since another instant (zero if `earlier` is later)
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, duration: Duration) -> Self::Output {
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Instant::from_nanos(self.nanos.saturating_add(delta))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Returns the current instant; must never go backwards
    fn now(&self) -> Instant;
}

/// Wall-anchored monotonic clock
///
/// Reads the wall clock once at construction and advances with
/// `std::time::Instant` afterwards, so `now()` is both epoch-based (useful
/// for `createdAt`) and monotonic (safe for deadlines).
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor_wall: Instant,
    anchor_mono: std::time::Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current wall time
    pub fn new() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self {
            anchor_wall: Instant::from_nanos(u64::try_from(wall.as_nanos()).unwrap_or(u64::MAX)),
            anchor_mono: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        self.anchor_wall + self.anchor_mono.elapsed()
    }
}
