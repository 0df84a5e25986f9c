use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" for window arithmetic.
///
/// Window scores are wall-clock microseconds so that every process sharing a store
/// agrees on them.
pub trait Clock: Send + Sync {
    /// Microseconds since the Unix epoch.
    fn now_micros(&self) -> i64;
}

/// [`Clock`] reading the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        i64::try_from(since_epoch.as_micros()).unwrap_or(i64::MAX)
    }
}
