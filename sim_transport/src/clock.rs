//! # Simulated Clock
//!
//! Deterministic time for tests. The clock only moves when told to, and
//! clones share the same time, so a test can hold one copy while endpoints
//! read another.

use core::time::Duration;
use rpc_types::{Clock, Instant};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Manually advanced clock
///
/// # Examples
///
/// ```
/// use sim_transport::SimClock;
/// use rpc_types::Clock;
///
/// let clock = SimClock::new();
/// assert_eq!(clock.now().as_millis(), 0);
///
/// clock.advance_millis(100);
/// assert_eq!(clock.now().as_millis(), 100);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    nanos: Arc<AtomicU64>,
}

impl SimClock {
    /// Creates a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock at a specific instant
    pub fn starting_at(start: Instant) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.as_nanos())),
        }
    }

    /// Moves time forward
    pub fn advance(&self, delta: Duration) {
        let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(delta))
            });
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Jumps to `target`
    ///
    /// # Panics
    ///
    /// Panics if `target` is earlier than the current time.
    pub fn set(&self, target: Instant) {
        let current = self.now();
        assert!(
            target >= current,
            "Cannot set clock backwards: {} < {}",
            target,
            current
        );
        self.nanos.store(target.as_nanos(), Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        Instant::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
