//! Deterministic simulation harness for strand timelines.
//!
//! [`SimEnv`] replaces wall-clock time and OS randomness with a
//! test-controlled clock and a seeded RNG, so a failing run replays from its
//! seed.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a naive reference timeline. Operations are
//! applied to both the model and the real implementation, and their
//! observable states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! mutation. Use [`InvariantRegistry::standard()`] for the timeline
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_env;

pub use invariants::{
    AdjacencyMatchesRescan, EchoTrackingConsistent, Invariant, InvariantRegistry,
    InvariantResult, RelationIndexMatchesStore, RenderableOrderFollowsStore, TimelineState,
    UniqueEventIds, Violation,
};
pub use model::{
    ModelTimeline, ObservableState, Operation, OperationError, OperationResult, RealTimeline,
    RenderedEntry, SmallEvent, SmallKind,
};
pub use sim_env::{SIM_EPOCH, SimEnv};
