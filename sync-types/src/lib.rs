//! # sync-types
//!
//! Data model types shared by the unicloud crates.
//!
//! - [`ClientName`], [`ShareName`], [`EventId`], [`Threshold`] - identity and configuration
//! - [`EventStatus`], [`ClientStatus`], [`SyncClassification`] - persisted status labels
//! - [`SyncError`] - parse and validation errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod status;

pub use error::SyncError;
pub use ids::{ClientName, EventId, ShareName, Threshold};
pub use status::{ClientStatus, EventStatus, SyncClassification};
