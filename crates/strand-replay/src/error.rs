//! Replay error types.

use strand_runtime::RuntimeError;
use strand_timeline::ConfigError;
use thiserror::Error;

/// Errors that stop a replay.
///
/// Steps the timeline rejects are not errors here; they are logged and the
/// replay moves on, since scripts routinely exercise out-of-order results.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Reading the script failed.
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),

    /// A script line is not a valid step.
    #[error("line {line}: {source}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A step refers to a send or page the script never created.
    #[error("line {line}: no {what} with index {index}")]
    UnknownReference {
        /// 1-based line number.
        line: usize,
        /// `"send"` or `"page"`.
        what: &'static str,
        /// Index used in the script.
        index: usize,
    },

    /// Timeline configuration from the command line is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The timeline actor stopped.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
