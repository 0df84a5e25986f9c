use std::{ops::Deref, sync::Arc};

use crate::ZwindowError;

/// Length of the trailing window, in milliseconds.
///
/// Must be at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowDurationMs(u64);

impl WindowDurationMs {
    /// Window length in microseconds, the unit of window scores.
    pub fn as_micros(&self) -> i64 {
        i64::try_from(self.0.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Key time-to-live: exactly one window.
    pub fn ttl_ms(&self) -> u64 {
        self.0
    }
}

impl Deref for WindowDurationMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowDurationMs {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Window duration must be at least 1 ms".to_string())
        } else {
            Ok(Self(value))
        }
    }
}

/// Maximum number of admitted events inside one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capacity(u64);

impl Deref for Capacity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for Capacity {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Capacity must be greater than 0".to_string())
        } else {
            Ok(Self(value))
        }
    }
}

/// A validated key prefix.
///
/// Client identities are plain strings; only the prefix is restricted, so that
/// `<prefix>:<identity>` can always be split back at its first colon.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct WindowKey(Arc<str>);

impl WindowKey {
    /// The prefix used when [`SlidingWindowOptions::prefix`](crate::SlidingWindowOptions::prefix) is `None`.
    pub fn default_prefix() -> Self {
        Self(Arc::from("zwindow"))
    }
}

impl Deref for WindowKey {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for WindowKey {
    type Error = ZwindowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(ZwindowError::InvalidWindowKey(
                "Window key must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(ZwindowError::InvalidWindowKey(
                "Window key must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(ZwindowError::InvalidWindowKey(
                "Window key must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for WindowKey {
    type Error = ZwindowError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// One recorded request attempt inside a client window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowEntry {
    /// Microseconds since the Unix epoch; the entry's score.
    pub timestamp_micros: i64,
    /// Unique member name of the entry.
    pub token: String,
}

/// Outcome of an atomic admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request was admitted and recorded.
    pub allowed: bool,
    /// Window size observed after pruning and before the (conditional) insert.
    pub count: u64,
}
