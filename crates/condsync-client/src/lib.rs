//! condsync client - async access to a condsync daemon
//!
//! Wraps one TCP connection in typed calls for each operation
//! (`init`, `set`, `wait`, `get`, `delete`, `reset`).

pub mod client;
pub mod error;

pub use client::{ClientConfig, SyncClient, DEFAULT_ADDRESS};
pub use error::{ClientError, Result};
