//! Read-only view handed to the presentation layer.

use std::sync::Arc;

use crate::{
    adjacency::{AdjacencyFlags, AdjacencyIndex},
    config::TimelineConfig,
    engine::{self, ReactionGroups, RenderableEvent, ResolvedContent},
    event::{EventRecord, UserId},
    store::TimelineSnapshot,
};

/// Immutable timeline state plus the queries the UI runs against it.
///
/// Cheap to clone. A view never changes; mutations produce a new one.
#[derive(Debug, Clone)]
pub struct TimelineView {
    snapshot: TimelineSnapshot,
    adjacency: AdjacencyIndex,
    config: Arc<TimelineConfig>,
    own_user: UserId,
}

impl TimelineView {
    pub(crate) fn new(
        snapshot: TimelineSnapshot,
        adjacency: AdjacencyIndex,
        config: Arc<TimelineConfig>,
        own_user: UserId,
    ) -> Self {
        Self { snapshot, adjacency, config, own_user }
    }

    /// Store version the view was taken at.
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    /// Underlying snapshot.
    pub fn snapshot(&self) -> &TimelineSnapshot {
        &self.snapshot
    }

    /// Adjacency index matching the snapshot.
    pub fn adjacency(&self) -> &AdjacencyIndex {
        &self.adjacency
    }

    /// Renderable events in store order.
    pub fn renderable_sequence(&self) -> Vec<RenderableEvent> {
        engine::renderable_sequence(&self.snapshot, &self.config)
    }

    /// Resolved content of a renderable event.
    pub fn resolved_content(&self, id: &str) -> Option<ResolvedContent> {
        engine::resolve_content(&self.snapshot, id, &self.config)
    }

    /// Edit history of a message.
    pub fn edit_history(&self, id: &str) -> Vec<Arc<EventRecord>> {
        engine::edit_history(&self.snapshot, id)
    }

    /// Reactions on an event.
    pub fn reaction_groups(&self, id: &str) -> ReactionGroups {
        engine::reaction_groups(&self.snapshot, id)
    }

    /// Connected-edge flags of a renderable event.
    pub fn adjacency_flags(&self, id: &str) -> Option<AdjacencyFlags> {
        self.adjacency.flags(id)
    }

    /// Room-list preview for the owning user.
    pub fn last_message_preview(&self) -> String {
        engine::last_message_preview(&self.snapshot, &self.own_user, &self.config)
    }
}
