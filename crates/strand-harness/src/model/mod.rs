//! Model-based testing.
//!
//! A naive [`ModelTimeline`] and the real [`RealTimeline`] receive the same
//! [`Operation`] stream; after every step both must report the same result
//! and the same [`ObservableState`].
//!
//! Placeholder ids embed a per-timeline nonce, so they are compared through
//! [`normalize_id`], which keeps only the sequence number.

mod operation;
mod real;
mod world;

pub use operation::{
    ID_SPACE, OWN_USER, Operation, OperationError, OperationResult, SENDERS, SmallEvent,
    SmallKind, confirmed_record, normalize_id,
};
pub use real::RealTimeline;
pub use world::{ModelTimeline, ObservableState, RenderedEntry};
