//! Async runtime for the strand timeline
//!
//! Backfill delivery, live sync and send completions are independent
//! producers. This crate gives each a cloneable [`TimelineHandle`] and funnels
//! their commands into one actor task that owns the [`strand_timeline::Timeline`],
//! so all mutations are serialized. Readers get immutable
//! [`strand_timeline::TimelineView`]s through a watch channel and only ever
//! observe fully applied states.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod actor;
mod error;
mod handle;

pub use error::RuntimeError;
pub use handle::{RuntimeConfig, TimelineHandle, TimelineRuntime};
