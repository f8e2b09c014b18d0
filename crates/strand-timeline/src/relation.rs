//! Relation index: target id to the records that refer to it.
//!
//! Maintained by [`crate::TimelineStore`] inside the same mutation that adds
//! or removes a relating record, so it is never observable out of step with
//! the store. Per-target lists follow store order: a backfilled relation
//! lands in front of relations that were already present, a live one behind
//! them. That makes the incremental index equal to
//! [`RelationIndex::from_records`] over the store at all times.
//!
//! The map is persistent, so cloning the index for a snapshot is constant
//! time and an update copies one path plus the touched target's list.

use std::{collections::HashMap, sync::Arc};

use crate::event::{EventId, EventRecord};

type TargetMap = imbl::HashMap<EventId, Vec<EventId>>;

/// Mapping from target id to ordered relating record ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationIndex {
    by_target: TargetMap,
}

impl RelationIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from records in store order.
    ///
    /// Reference implementation for the incremental updates.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.append(record);
        }
        index
    }

    /// Relating record ids for `target`, in store order. Empty if none.
    pub fn relations_of(&self, target: &str) -> &[EventId] {
        self.by_target.get(target).map_or(&[], Vec::as_slice)
    }

    /// Number of targets with at least one relation.
    pub fn target_count(&self) -> usize {
        self.by_target.len()
    }

    /// Total number of indexed relations.
    pub fn relation_count(&self) -> usize {
        self.by_target.values().map(Vec::len).sum()
    }

    pub(crate) fn append(&mut self, record: &EventRecord) {
        let Some(target) = record.target() else {
            return;
        };
        match self.by_target.get_mut(target) {
            Some(list) => list.push(record.id.clone()),
            None => {
                self.by_target.insert(target.clone(), vec![record.id.clone()]);
            },
        }
    }

    /// Index a backfilled block that was prepended to the store.
    pub(crate) fn prepend_batch(&mut self, batch: &[Arc<EventRecord>]) {
        let mut fronts: HashMap<&EventId, Vec<EventId>> = HashMap::new();
        for record in batch {
            if let Some(target) = record.target() {
                fronts.entry(target).or_default().push(record.id.clone());
            }
        }

        for (target, ids) in fronts {
            match self.by_target.get_mut(target) {
                Some(list) => {
                    list.splice(0..0, ids);
                },
                None => {
                    self.by_target.insert(target.clone(), ids);
                },
            }
        }
    }

    pub(crate) fn remove(&mut self, record: &EventRecord) {
        let Some(target) = record.target() else {
            return;
        };
        if let Some(list) = self.by_target.get_mut(target.as_str()) {
            list.retain(|id| *id != record.id);
            if list.is_empty() {
                self.by_target.remove(target.as_str());
            }
        }
    }

    /// Swap `old` for `new` in place when both relate to the same target.
    ///
    /// Returns `false` when the targets differ; the caller then has to place
    /// `new` by store position.
    pub(crate) fn replace(&mut self, old: &EventRecord, new: &EventRecord) -> bool {
        match (old.target(), new.target()) {
            (None, None) => true,
            (Some(a), Some(b)) if a == b => {
                if let Some(slot) = self
                    .by_target
                    .get_mut(a.as_str())
                    .and_then(|list| list.iter_mut().find(|id| **id == old.id))
                {
                    *slot = new.id.clone();
                }
                true
            },
            _ => false,
        }
    }

    /// Recompute one target's list from records in store order.
    pub(crate) fn rebuild_target<'a>(
        &mut self,
        target: &EventId,
        records: impl IntoIterator<Item = &'a EventRecord>,
    ) {
        let ids: Vec<EventId> = records
            .into_iter()
            .filter(|r| r.target() == Some(target))
            .map(|r| r.id.clone())
            .collect();

        if ids.is_empty() {
            self.by_target.remove(target.as_str());
        } else {
            self.by_target.insert(target.clone(), ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Timestamp;

    fn reaction(id: &str, target: &str) -> EventRecord {
        EventRecord::reaction(id, "u1", Timestamp::from_secs(1), target, "👍")
    }

    #[test]
    fn unknown_target_is_empty() {
        let index = RelationIndex::new();
        assert!(index.relations_of("$missing").is_empty());
    }

    #[test]
    fn prepend_batch_lands_in_front() {
        let mut index = RelationIndex::new();
        index.append(&reaction("r3", "e1"));

        let batch = vec![Arc::new(reaction("r1", "e1")), Arc::new(reaction("r2", "e1"))];
        index.prepend_batch(&batch);

        let ids: Vec<_> = index.relations_of("e1").iter().map(EventId::as_str).collect();
        assert_eq!(ids, ["r1", "r2", "r3"]);
    }

    #[test]
    fn remove_prunes_empty_targets() {
        let mut index = RelationIndex::new();
        let r1 = reaction("r1", "e1");
        index.append(&r1);
        index.remove(&r1);

        assert_eq!(index.target_count(), 0);
        assert_eq!(index.relation_count(), 0);
    }

    #[test]
    fn replace_keeps_position() {
        let mut index = RelationIndex::new();
        let echo = reaction("~a.0", "e1");
        index.append(&echo);
        index.append(&reaction("r9", "e1"));

        let confirmed = reaction("r5", "e1");
        assert!(index.replace(&echo, &confirmed));

        let ids: Vec<_> = index.relations_of("e1").iter().map(EventId::as_str).collect();
        assert_eq!(ids, ["r5", "r9"]);
    }

    #[test]
    fn replace_across_targets_defers_to_caller() {
        let mut index = RelationIndex::new();
        let echo = reaction("~a.0", "e1");
        index.append(&echo);

        assert!(!index.replace(&echo, &reaction("r5", "e2")));
    }
}
