//! condsync core - condition and solution primitives
//!
//! A [`Solution`] is a namespace of named, integer-valued [`Condition`]s
//! that independent processes wait on and signal through the daemon.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod condition;
pub mod outcome;
pub mod solution;

pub use condition::{CellState, Condition, UNSET};
pub use outcome::{SetOutcome, WaitOutcome, WaitTimeout};
pub use solution::Solution;
