//! Background deadline timer
//!
//! One thread per router sleeps until the earliest pending deadline, then
//! settles every overdue call. It only holds a weak link to its owner and
//! exits once the owner is dropped or stopped.

use crate::sync::lock;
use core::time::Duration;
use std::io;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;

/// Outcome of one timer pass
pub(crate) enum Tick {
    /// Sleep this long, or until woken when `None`
    Sleep(Option<Duration>),
    Finished,
}

/// Owner of the deadlines the timer watches
pub(crate) trait DeadlineQueue: Send + Sync {
    /// Settles overdue calls and reports when to look again
    fn tick(&self) -> Tick;
}

#[derive(Default)]
struct WakeState {
    generation: u64,
    shutdown: bool,
}

/// Wakes the timer thread early
#[derive(Default)]
pub(crate) struct TimerSignal {
    state: Mutex<WakeState>,
    wake: Condvar,
}

impl TimerSignal {
    /// A deadline was added; the timer re-reads the earliest one
    pub(crate) fn notify(&self) {
        lock(&self.state).generation += 1;
        self.wake.notify_all();
    }

    pub(crate) fn shutdown(&self) {
        lock(&self.state).shutdown = true;
        self.wake.notify_all();
    }

    fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Sleeps until `limit` elapses or a notify after `seen`; false on shutdown
    fn sleep(&self, seen: u64, limit: Option<Duration>) -> bool {
        let state = lock(&self.state);
        let keep_sleeping = |state: &mut WakeState| state.generation == seen && !state.shutdown;
        let state = match limit {
            Some(limit) => {
                self.wake
                    .wait_timeout_while(state, limit, keep_sleeping)
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .0
            }
            None => self
                .wake
                .wait_while(state, keep_sleeping)
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        };
        !state.shutdown
    }
}

/// Starts the timer thread for `queue`
pub(crate) fn spawn<Q>(queue: Weak<Q>, signal: Arc<TimerSignal>) -> io::Result<()>
where
    Q: DeadlineQueue + 'static,
{
    thread::Builder::new()
        .name("rpc-timeouts".to_string())
        .spawn(move || run(&queue, &signal))
        .map(|_| ())
}

fn run<Q: DeadlineQueue>(queue: &Weak<Q>, signal: &TimerSignal) {
    loop {
        let seen = signal.generation();
        let limit = match queue.upgrade().map(|queue| queue.tick()) {
            Some(Tick::Sleep(limit)) => limit,
            Some(Tick::Finished) | None => return,
        };
        if !signal.sleep(seen, limit) {
            return;
        }
    }
}
