//! A namespace of conditions.
//!
//! Locking is two-tier:
//! - the solution's map lock guards insertion and removal of conditions
//! - each condition's own monitor guards its value and its waiters
//!
//! The map lock is only held for the structural change itself, so waits
//! on unrelated conditions never contend with each other.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Races with concurrent deletion surface as tagged outcomes

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::condition::{CellState, Condition, UNSET};
use crate::outcome::{SetOutcome, WaitOutcome, WaitTimeout};

/// A named namespace of conditions.
///
/// All operations are safe to call concurrently from any number of
/// connection handlers. Conditions are created lazily on first
/// reference and destroyed by [`Solution::delete_condition`] or
/// [`Solution::reset`].
#[derive(Debug)]
pub struct Solution {
    name: String,
    conditions: Mutex<HashMap<String, Arc<Condition>>>,
}

impl Solution {
    /// Creates an empty solution.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the solution name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of live conditions.
    pub async fn len(&self) -> usize {
        self.conditions.lock().await.len()
    }

    /// Returns true if the solution holds no conditions.
    pub async fn is_empty(&self) -> bool {
        self.conditions.lock().await.is_empty()
    }

    /// Looks up a condition, creating it at [`UNSET`] if absent.
    async fn condition(&self, name: &str) -> Arc<Condition> {
        let mut conditions = self.conditions.lock().await;
        if let Some(existing) = conditions.get(name) {
            return Arc::clone(existing);
        }

        debug!(solution = %self.name, condition = %name, "Creating condition");
        let created = Arc::new(Condition::new());
        conditions.insert(name.to_string(), Arc::clone(&created));
        created
    }

    /// Returns the current state of a condition, creating it if absent.
    ///
    /// A condition deleted between lookup and read reports [`UNSET`],
    /// the same value a freshly created one would hold.
    pub async fn get_condition_state(&self, name: &str) -> i64 {
        self.condition(name).await.state().unwrap_or(UNSET)
    }

    /// Stores `value` into a condition, creating it if absent, and wakes
    /// every waiter on it.
    pub async fn set_condition_state(&self, name: &str, value: i64) -> SetOutcome {
        let condition = self.condition(name).await;

        if condition.store(value) {
            debug!(solution = %self.name, condition = %name, value, "Condition set");
            SetOutcome::Stored(value)
        } else {
            warn!(
                solution = %self.name,
                condition = %name,
                value,
                "Condition deleted before it could be set"
            );
            SetOutcome::Removed
        }
    }

    /// Removes a condition, waking any waiter before it becomes unreachable.
    ///
    /// Returns true if the condition existed.
    pub async fn delete_condition(&self, name: &str) -> bool {
        let mut conditions = self.conditions.lock().await;
        match conditions.remove(name) {
            Some(condition) => {
                condition.retire();
                debug!(solution = %self.name, condition = %name, "Condition deleted");
                true
            }
            None => false,
        }
    }

    /// Deletes every condition, one at a time.
    ///
    /// Returns the number of conditions removed.
    pub async fn reset(&self) -> usize {
        let names: Vec<String> = self.conditions.lock().await.keys().cloned().collect();

        let mut removed = 0;
        for name in names {
            if self.delete_condition(&name).await {
                removed += 1;
            }
        }

        debug!(solution = %self.name, removed, "Solution reset");
        removed
    }

    /// Blocks until the condition equals `target` or the timeout elapses.
    ///
    /// Every wake re-reads the latest settled value and re-tests it, so
    /// wakes caused by writes of other values simply resume waiting
    /// against the same deadline. Only a matching set, a deletion of the
    /// condition, or the deadline end the wait.
    pub async fn wait_for_cond(&self, name: &str, target: i64, timeout: WaitTimeout) -> WaitOutcome {
        let condition = self.condition(name).await;
        let mut cell = condition.subscribe();

        let deadline = match timeout {
            WaitTimeout::Unbounded => None,
            WaitTimeout::Bounded(duration) => Some(Instant::now() + duration),
        };

        loop {
            match *cell.borrow_and_update() {
                CellState::Live(value) if value == target => return WaitOutcome::Matched,
                CellState::Live(_) => {}
                CellState::Retired => {
                    warn!(
                        solution = %self.name,
                        condition = %name,
                        target,
                        "Condition deleted while waiting"
                    );
                    return WaitOutcome::Removed;
                }
            }

            let changed = match deadline {
                None => cell.changed().await,
                Some(deadline) => match timeout_at(deadline, cell.changed()).await {
                    Ok(changed) => changed,
                    Err(_) => {
                        return match *cell.borrow() {
                            CellState::Live(value) if value == target => WaitOutcome::Matched,
                            _ => WaitOutcome::TimedOut,
                        };
                    }
                },
            };

            // The sender lives inside `condition`, which this frame keeps alive.
            if changed.is_err() {
                return WaitOutcome::Removed;
            }
        }
    }
}
