//! Rate-limited failure logging.
//!
//! When the collector is down every cycle fails the same way; one warning
//! per interval is enough.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Lets one event through per `interval` and counts the rest.
pub struct LogThrottle {
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
    /// Events swallowed since the last one let through
    suppressed: AtomicU64,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Returns `Some(suppressed_since_last)` if the caller should log now.
    pub fn check(&self) -> Option<u64> {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> Option<u64> {
        let mut last = self.last_emit.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.interval => {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                None
            }
            _ => {
                *last = Some(now);
                Some(self.suppressed.swap(0, Ordering::Relaxed))
            }
        }
    }
}
