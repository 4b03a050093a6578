//! A single named condition cell.
//!
//! The monitor for a condition is a `tokio::sync::watch` channel: its
//! internal lock serialises every writer, and every committed write
//! wakes all receivers, which then re-read the latest settled value.

use tokio::sync::watch;

/// State of a condition that has never been set.
pub const UNSET: i64 = -1;

/// Value held by a condition's monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Condition is reachable from its solution and holds a value.
    Live(i64),

    /// Condition was deleted; its object must never be reused.
    Retired,
}

/// A named, integer-valued synchronization point.
///
/// Conditions are owned by a [`Solution`](crate::Solution) and are only
/// mutated through it. Once retired, a condition stays retired; the
/// solution creates a fresh one at [`UNSET`] when the name is referenced
/// again.
#[derive(Debug)]
pub struct Condition {
    cell: watch::Sender<CellState>,
}

impl Condition {
    /// Creates a live condition holding [`UNSET`].
    pub(crate) fn new() -> Self {
        let (cell, _) = watch::channel(CellState::Live(UNSET));
        Self { cell }
    }

    /// Returns the current state, or `None` if the condition was retired.
    pub(crate) fn state(&self) -> Option<i64> {
        match *self.cell.borrow() {
            CellState::Live(value) => Some(value),
            CellState::Retired => None,
        }
    }

    /// Stores `value` and wakes every waiter.
    ///
    /// Returns `false` without touching the cell if it was retired.
    pub(crate) fn store(&self, value: i64) -> bool {
        self.cell.send_if_modified(|state| match state {
            CellState::Live(current) => {
                *current = value;
                true
            }
            CellState::Retired => false,
        })
    }

    /// Retires the condition, waking every waiter.
    pub(crate) fn retire(&self) {
        self.cell.send_replace(CellState::Retired);
    }

    /// Returns a receiver observing every committed write.
    pub(crate) fn subscribe(&self) -> watch::Receiver<CellState> {
        self.cell.subscribe()
    }

    /// Returns true once the condition has been retired.
    pub fn is_retired(&self) -> bool {
        self.state().is_none()
    }
}
