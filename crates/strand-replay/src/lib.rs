//! Scripted replay for strand timelines
//!
//! Reads a JSON-lines script of session steps, drives a timeline actor
//! through it and renders the resulting view as text. Meant for reproducing
//! reconciliation bugs from captured sessions.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod render;
mod replay;
mod script;

pub use error::ReplayError;
pub use render::Rendered;
pub use replay::replay;
pub use script::{ScriptLine, Step, parse_script};
