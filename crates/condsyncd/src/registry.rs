//! Server-wide registry of solutions.
//!
//! The registry is an explicit context object: the server owns one and
//! hands an `Arc` to every connection handler, so several independent
//! servers can live in one process (integration tests rely on this).
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Locks are tokio locks and cannot be poisoned

use std::collections::HashMap;
use std::sync::Arc;

use condsync_core::Solution;
use tokio::sync::RwLock;
use tracing::info;

/// Map from solution name to its single shared [`Solution`].
///
/// Solutions are created lazily and live until the registry is dropped.
#[derive(Debug, Default)]
pub struct SolutionRegistry {
    solutions: RwLock<HashMap<String, Arc<Solution>>>,
}

impl SolutionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the solution named `name`, creating it on first reference.
    ///
    /// Exactly one instance ever wins for a given name; every caller,
    /// concurrent or later, receives that same instance.
    pub async fn get_or_create(&self, name: &str) -> Arc<Solution> {
        if let Some(existing) = self.solutions.read().await.get(name) {
            return Arc::clone(existing);
        }

        let mut solutions = self.solutions.write().await;
        let solution = solutions.entry(name.to_string()).or_insert_with(|| {
            info!(solution = %name, "Creating solution");
            Arc::new(Solution::new(name))
        });
        Arc::clone(solution)
    }

    /// Returns the number of solutions created so far.
    pub async fn len(&self) -> usize {
        self.solutions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.solutions.read().await.is_empty()
    }
}
