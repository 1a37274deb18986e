//! # unicloud-sync-server
//!
//! Synchronization state engine for unicloud.
//!
//! Remote clients report the start and end of each synchronization run.
//! This crate records those runs as events, recovers runs whose client
//! never reported back, and derives each client's freshness from its
//! history:
//!
//! - **Event lifecycle**: open, close and interrupted-run recovery
//! - **Status evaluation**: `Never` / `InSync` / `OutOfSync` per client
//! - **Scheduler**: periodic status refresh, share size refresh and log
//!   retention, each on its own timer
//!
//! ## Architecture
//!
//! ```text
//! client agents ──► HTTP ──► EventManager ──┐
//!                                           ├──► SyncStore (SQLite)
//! Scheduler ──► StatusEvaluator ────────────┤
//!          └──► ShareRegistry ──► ShareSizer┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clients;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod http;
pub mod lifecycle;
pub mod scheduler;
pub mod server;
pub mod shares;
pub mod storage;
