//! # sync-core
//!
//! Pure logic for unicloud (no I/O, instant tests).
//!
//! This crate holds the rules that decide how synchronization events move
//! through their lifecycle and how a client's freshness is derived from
//! them. Nothing here touches the database or the network.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time enters through the [`Clock`] trait so that the
//! server can be driven by a [`ManualClock`] in tests.
//!
//! The actual I/O (database reads and writes, timers) is performed by
//! `sync-server`, which applies the decisions made here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod clock;
pub mod lifecycle;
pub mod retention;

pub use classify::classify;
pub use clock::{Clock, ManualClock, SystemClock};
pub use lifecycle::{
    duration_secs, transition, LifecycleError, Outcome, Transition, INTERRUPTED_LOG,
};
pub use retention::log_retention_cutoff;
