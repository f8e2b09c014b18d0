//! Standard invariant checks.

use std::collections::HashSet;

use strand_timeline::{EventId, Provenance, RelationIndex, SendState, compute_adjacency};

use super::{Invariant, InvariantResult, TimelineState, Violation};

/// The store never holds two records with the same id, and id lookup agrees
/// with the ordered sequence.
pub struct UniqueEventIds;

impl Invariant for UniqueEventIds {
    fn name(&self) -> &'static str {
        "unique_event_ids"
    }

    fn check(&self, state: &TimelineState) -> InvariantResult {
        let snapshot = state.snapshot();
        let mut seen = HashSet::new();

        for record in snapshot.iter() {
            if !seen.insert(record.id.clone()) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("id {} stored twice", record.id),
                });
            }
            if snapshot.get(record.id.as_str()) != Some(record) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("id lookup for {} disagrees with store order", record.id),
                });
            }
        }
        Ok(())
    }
}

/// The incrementally maintained relation index equals one rebuilt from the
/// store.
pub struct RelationIndexMatchesStore;

impl Invariant for RelationIndexMatchesStore {
    fn name(&self) -> &'static str {
        "relation_index_matches_store"
    }

    fn check(&self, state: &TimelineState) -> InvariantResult {
        let snapshot = state.snapshot();
        let rebuilt = RelationIndex::from_records(snapshot.iter().map(AsRef::as_ref));

        if *snapshot.relations() != rebuilt {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "incremental index has {} relations over {} targets, rebuild has {} over {}",
                    snapshot.relations().relation_count(),
                    snapshot.relations().target_count(),
                    rebuilt.relation_count(),
                    rebuilt.target_count()
                ),
            });
        }
        Ok(())
    }
}

/// The incremental adjacency index equals the full rescan.
pub struct AdjacencyMatchesRescan;

impl Invariant for AdjacencyMatchesRescan {
    fn name(&self) -> &'static str {
        "adjacency_matches_rescan"
    }

    fn check(&self, state: &TimelineState) -> InvariantResult {
        let incremental = state.view.adjacency().entries();
        let rescan =
            compute_adjacency(state.snapshot().iter().map(AsRef::as_ref), state.adjacency_window);

        if incremental != rescan {
            let first_mismatch = incremental
                .iter()
                .zip(&rescan)
                .find(|(a, b)| a != b)
                .map(|(a, b)| format!("{a:?} vs {b:?}"))
                .unwrap_or_else(|| format!("{} vs {} entries", incremental.len(), rescan.len()));
            return Err(Violation { invariant: self.name(), message: first_mismatch });
        }
        Ok(())
    }
}

/// The echo manager tracks exactly the store's unconfirmed local echoes, in
/// the same order and state, and everything else is `Sent`.
pub struct EchoTrackingConsistent;

impl Invariant for EchoTrackingConsistent {
    fn name(&self) -> &'static str {
        "echo_tracking_consistent"
    }

    fn check(&self, state: &TimelineState) -> InvariantResult {
        let mut in_store: Vec<(EventId, SendState)> = Vec::new();

        for record in state.snapshot().iter() {
            match (record.provenance, record.send_state) {
                (Provenance::LocalEcho, SendState::Pending | SendState::Failed) => {
                    in_store.push((record.id.clone(), record.send_state));
                },
                (_, SendState::Sent) => {},
                (provenance, send_state) => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{} has provenance {provenance:?} but state {send_state:?}",
                            record.id
                        ),
                    });
                },
            }
        }

        if in_store != state.echoes {
            return Err(Violation {
                invariant: self.name(),
                message: format!("store echoes {in_store:?}, manager tracks {:?}", state.echoes),
            });
        }
        Ok(())
    }
}

/// The renderable sequence is the store's renderable records in store order.
pub struct RenderableOrderFollowsStore;

impl Invariant for RenderableOrderFollowsStore {
    fn name(&self) -> &'static str {
        "renderable_order_follows_store"
    }

    fn check(&self, state: &TimelineState) -> InvariantResult {
        let rendered: Vec<EventId> =
            state.view.renderable_sequence().into_iter().map(|e| e.record.id.clone()).collect();
        let expected: Vec<EventId> = state
            .snapshot()
            .iter()
            .filter(|r| r.is_renderable())
            .map(|r| r.id.clone())
            .collect();

        if rendered != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!("rendered {rendered:?}, store order {expected:?}"),
            });
        }
        Ok(())
    }
}
