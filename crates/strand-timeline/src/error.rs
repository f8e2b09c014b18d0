//! Error types for the timeline core.
//!
//! Duplicate inserts and unresolved relations are steady-state conditions and
//! never surface here. What remains are mutations addressed at records that
//! do not exist or are not in the expected lifecycle state, plus invalid
//! configuration.

use std::time::Duration;

use thiserror::Error;

use crate::event::{EventId, SendState};

/// Errors from timeline mutations.
///
/// A failed mutation leaves the store untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// No local echo with this placeholder id exists.
    #[error("unknown local echo {0}")]
    UnknownEcho(EventId),

    /// Local echo exists but is not in a state that allows the operation.
    #[error("local echo {id} is {actual:?}, expected {expected:?}")]
    InvalidEchoState {
        /// Placeholder id of the echo.
        id: EventId,
        /// State the echo is in.
        actual: SendState,
        /// State the operation requires.
        expected: SendState,
    },

    /// No record with this id exists.
    #[error("record {0} not found")]
    NotFound(EventId),

    /// Text or edit send with an empty body.
    #[error("refusing to send an empty body")]
    EmptyBody,

    /// Relation aimed at an echo the server has not confirmed yet.
    #[error("cannot relate to unconfirmed local echo {0}")]
    TargetNotConfirmed(EventId),
}

impl TimelineError {
    /// Whether the error is explained by the session delivering outcomes out
    /// of order (a send result for an echo already retracted, a duplicate
    /// result) rather than by a caller bug.
    pub fn is_ordering_fault(&self) -> bool {
        matches!(self, Self::UnknownEcho(_) | Self::InvalidEchoState { .. })
    }
}

/// Invalid [`crate::TimelineConfig`] values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Adjacency window of zero would never connect anything.
    #[error("adjacency window must be non-zero")]
    ZeroAdjacencyWindow,

    /// Adjacency window longer than the same-day constraint can use.
    #[error("adjacency window {window:?} exceeds one day")]
    AdjacencyWindowTooLarge {
        /// Configured window.
        window: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_lookups_are_ordering_faults() {
        assert!(TimelineError::UnknownEcho(EventId::new("~1.0")).is_ordering_fault());
        assert!(
            TimelineError::InvalidEchoState {
                id: EventId::new("~1.0"),
                actual: SendState::Failed,
                expected: SendState::Pending,
            }
            .is_ordering_fault()
        );
    }

    #[test]
    fn caller_bugs_are_not_ordering_faults() {
        assert!(!TimelineError::EmptyBody.is_ordering_fault());
        assert!(!TimelineError::NotFound(EventId::new("$x")).is_ordering_fault());
        assert!(!TimelineError::TargetNotConfirmed(EventId::new("~1.0")).is_ordering_fault());
    }
}
