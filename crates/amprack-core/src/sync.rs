//! Cycle rendezvous between the audio thread and the reconfiguration worker.
//!
//! The audio thread calls [`Rendezvous::arrive`] once at the end of every
//! processed buffer, whether or not anyone is listening. A worker that has
//! just withdrawn a resource from the audio thread waits (bounded) for the
//! next arrival, after which no processing cycle that started before the
//! withdrawal can still be running.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Longest a waiter stays parked before rechecking the generation.
const RECHECK: Duration = Duration::from_millis(1);

/// Generation counter plus broadcast wake-up, reused for every cycle.
#[derive(Debug, Default)]
pub struct Rendezvous {
    generation: AtomicU64,
    lock: Mutex<()>,
    signal: Condvar,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the end of a processing cycle. Never blocks.
    ///
    /// The notify happens under the lock whenever it is free, so a waiter is
    /// either still before its generation check or already parked. When a
    /// waiter holds the lock, [`Rendezvous::wait_past`] picks the arrival up
    /// within one 1ms recheck slice.
    #[inline]
    pub fn arrive(&self) {
        self.generation.fetch_add(1, Ordering::Release);
        let _guard = self.lock.try_lock();
        self.signal.notify_all();
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Wait until the generation moves past `seen`, for at most `timeout`.
    ///
    /// Returns `false` if no cycle completed in time.
    pub fn wait_past(&self, seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();

        while self.generation() == seen {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.signal
                .wait_until(&mut guard, deadline.min(now + RECHECK));
        }
        true
    }

    /// Wait for the next cycle to complete after this call.
    pub fn await_next(&self, timeout: Duration) -> bool {
        let seen = self.generation();
        self.wait_past(seen, timeout)
    }
}
