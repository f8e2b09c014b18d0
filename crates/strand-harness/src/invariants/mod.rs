//! Invariant checking for timeline simulation.
//!
//! Invariants are properties that must hold after every mutation, whatever
//! sequence of backfill, live sync and send outcomes led there. They run
//! against a [`TimelineState`] captured from the timeline rather than the
//! live structure, so a check always sees one consistent state.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_all(&TimelineState::capture(&timeline))?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    AdjacencyMatchesRescan, EchoTrackingConsistent, RelationIndexMatchesStore,
    RenderableOrderFollowsStore, UniqueEventIds,
};
pub use snapshot::TimelineState;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against captured timeline state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the captured state.
    fn check(&self, state: &TimelineState) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard timeline invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(UniqueEventIds);
        registry.add(RelationIndexMatchesStore);
        registry.add(AdjacencyMatchesRescan);
        registry.add(EchoTrackingConsistent);
        registry.add(RenderableOrderFollowsStore);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants. Returns every violation found.
    pub fn check_all(&self, state: &TimelineState) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use strand_timeline::{Timeline, TimelineConfig};

    use super::*;
    use crate::SimEnv;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn empty_timeline_passes_invariants() {
        let timeline =
            Timeline::new(SimEnv::with_seed(0), "@me", TimelineConfig::default()).unwrap();
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&TimelineState::capture(&timeline)).is_ok());
    }
}
