//! Timeline reconciliation for chat event streams
//!
//! Merges three independent event sources (historical backfill, live sync and
//! local optimistic sends) into one ordered, deduplicated timeline and
//! derives what a client renders from it.
//!
//! # Components
//!
//! - [`TimelineStore`]: ordered, deduplicated records with copy-on-write
//!   snapshots
//! - [`RelationIndex`]: target id to relating records (edits, reactions,
//!   redactions)
//! - [`engine`]: renderable sequence, edit and redaction resolution, reaction
//!   aggregation
//! - [`AdjacencyIndex`]: incremental connected-edge grouping
//! - [`OutgoingEchoManager`]: local sends from submission to confirmation
//! - [`Timeline`]: single-writer state machine tying the above together
//!
//! No component performs I/O. Time and randomness come from an
//! [`Environment`] so tests can run deterministically.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod adjacency;
mod config;
mod echo;
pub mod engine;
mod env;
mod error;
mod event;
mod relation;
mod session;
mod store;
mod timeline;
mod view;

pub use adjacency::{AdjacencyFlags, AdjacencyIndex, compute_adjacency};
pub use config::{DEFAULT_ADJACENCY_WINDOW, TimelineConfig};
pub use echo::{EchoEntry, OutgoingEchoManager, OutgoingPayload};
pub use engine::{ContentStatus, ReactionGroups, RenderableEvent, ResolvedContent};
pub use env::{Environment, SystemEnv};
pub use error::{ConfigError, TimelineError};
pub use event::{
    Content, EventId, EventKind, EventRecord, MILLIS_PER_DAY, Membership, Provenance, RelatesTo,
    RelationType, SendState, Timestamp, UserId,
};
pub use relation::RelationIndex;
pub use session::{Direction, PaginationToken, PaginationTracker, SendOutcome, SessionEvent};
pub use store::{InsertOutcome, ResolvedEcho, TimelineSnapshot, TimelineStore};
pub use timeline::{Timeline, TimelineUpdate};
pub use view::TimelineView;
