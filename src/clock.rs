//! Per-engine monotonic timestamp generation.
//!
//! Wall-clock milliseconds collide under high write rates, so every engine
//! instance owns one [`MonotonicClock`] and stamps every mutation (WAL
//! record, memtable insert, flushed/compacted run) through it rather than
//! calling [`now_ms`] directly at the call site.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_millis() as i64
}

/// Hands out strictly increasing timestamps: `max(now_ms(), last + 1)`.
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    /// A clock seeded at the current wall-clock time.
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(now_ms()),
        }
    }

    /// Produce the next timestamp, guaranteed greater than every timestamp
    /// previously returned by this clock (and every value passed to
    /// [`observe`](Self::observe)).
    pub fn next(&self) -> i64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms().max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Bump the clock so that future [`next`](Self::next) calls exceed
    /// `timestamp`. Used at startup to seed the clock past WAL-recovered
    /// timestamps before accepting new writes.
    pub fn observe(&self, timestamp: i64) {
        let mut prev = self.last.load(Ordering::Relaxed);
        while timestamp > prev {
            match self
                .last
                .compare_exchange_weak(prev, timestamp, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
