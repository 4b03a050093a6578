//! Tagged results of solution operations.
//!
//! Each outcome keeps the integer code existing clients see on the wire
//! (`-1` for a lost set, `1`/`0`/`-2` for waits).

use std::fmt;
use std::time::Duration;

/// Result of storing a value into a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The value was stored and all waiters were woken.
    Stored(i64),

    /// The condition was deleted between lookup and store; nothing changed.
    Removed,
}

impl SetOutcome {
    /// Wire representation: the stored value, or `-1` when removed.
    pub fn state(self) -> i64 {
        match self {
            Self::Stored(value) => value,
            Self::Removed => -1,
        }
    }
}

/// Result of waiting for a condition to reach a target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition held the target value.
    Matched,

    /// The deadline passed before the target value was observed.
    TimedOut,

    /// The condition was deleted while waiting.
    Removed,
}

impl WaitOutcome {
    /// Wire code: `1` matched, `0` timed out, `-2` removed.
    pub fn code(self) -> i64 {
        match self {
            Self::Matched => 1,
            Self::TimedOut => 0,
            Self::Removed => -2,
        }
    }

    /// Inverse of [`WaitOutcome::code`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Matched),
            0 => Some(Self::TimedOut),
            -2 => Some(Self::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// How long a wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// No deadline (wire value `0`).
    Unbounded,

    /// Give up after this long.
    Bounded(Duration),
}

impl WaitTimeout {
    /// Builds a timeout from milliseconds, where `0` means no deadline.
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self::Unbounded
        } else {
            Self::Bounded(Duration::from_millis(millis))
        }
    }

    /// Milliseconds as sent on the wire.
    pub fn as_millis(self) -> u64 {
        match self {
            Self::Unbounded => 0,
            Self::Bounded(duration) => u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
