//! condsync daemon - solution registry and condition server
//!
//! This crate provides the core infrastructure for the condsync daemon:
//! - `registry` - Server-wide map of named solutions
//! - `server` - TCP server and per-client connection handlers
//! - `config` - Layered daemon configuration
//! - `diagnostics` - Port-holder lookup for bind failures
//! - `monitor` - Periodic CPU/memory logging
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      condsyncd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   SyncServer    │────▶│     SolutionRegistry        │    │
//! │  │     (TCP)       │     │  (name -> Arc<Solution>)    │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ connections                 │ conditions        │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ConnectionHandler│     │   watch::Sender<CellState>  │    │
//! │  │  (per client)   │     │   (one per condition)       │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - A panic during dispatch is contained to its connection

pub mod config;
pub mod diagnostics;
pub mod monitor;
pub mod registry;
pub mod server;
