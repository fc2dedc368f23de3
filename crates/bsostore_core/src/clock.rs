//! Server time sources.

use crate::types::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of server time for `modified` assignment and ttl expiry.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current server time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::from_centis((elapsed.as_millis() / 10) as u64)
    }
}

/// A clock that only moves when told to.
///
/// Used by tests that need deterministic timestamps and ttl expiry.
#[derive(Debug, Default)]
pub struct ManualClock {
    centis: AtomicU64,
}

impl ManualClock {
    /// Creates a clock stopped at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            centis: AtomicU64::new(start.as_centis()),
        }
    }

    /// Moves the clock to `ts`.
    pub fn set(&self, ts: Timestamp) {
        self.centis.store(ts.as_centis(), Ordering::SeqCst);
    }

    /// Advances the clock by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.centis
            .fetch_add(secs.saturating_mul(100), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_centis(self.centis.load(Ordering::SeqCst))
    }
}
