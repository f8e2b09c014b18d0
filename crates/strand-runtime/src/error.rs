//! Runtime error types.

use strand_timeline::TimelineError;
use thiserror::Error;

/// Errors returned through a [`crate::TimelineHandle`].
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The actor has stopped; no further commands are accepted.
    #[error("timeline actor is not running")]
    ActorClosed,

    /// The timeline rejected the command.
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// The actor task panicked or was aborted.
    #[error("timeline actor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RuntimeError {
    /// Whether retrying the same command later cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ActorClosed | Self::Join(_))
    }
}
