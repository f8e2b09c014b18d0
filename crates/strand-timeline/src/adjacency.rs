//! Connected-edge grouping between consecutive renderable events.
//!
//! Two neighbours in the renderable sequence connect when they come from the
//! same sender on the same UTC day within the adjacency window, neither is a
//! membership change, and both are confirmed or both are still pending.
//!
//! [`compute_adjacency`] is the full rescan. [`AdjacencyIndex`] maintains the
//! same answer incrementally: every renderable record gets a slot (prepends
//! count down from -1, appends count up from 0) so store order is the slot
//! order, and a mutation only relinks the touched node and its predecessor.
//! Both maps are persistent, so a view can hold the index by value.

use std::{
    ops::Bound::{Excluded, Unbounded},
    sync::Arc,
    time::Duration,
};

use imbl::{HashMap, OrdMap};

use crate::event::{EventId, EventKind, EventRecord, SendState};

/// Whether a renderable event connects to its neighbours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AdjacencyFlags {
    /// Connects to the previous renderable event.
    pub top: bool,
    /// Connects to the next renderable event.
    pub bottom: bool,
}

/// Whether `a` and `b`, adjacent in the renderable sequence, connect.
pub fn connected(a: &EventRecord, b: &EventRecord, window: Duration) -> bool {
    if a.kind == EventKind::MembershipChange || b.kind == EventKind::MembershipChange {
        return false;
    }
    if a.sender != b.sender {
        return false;
    }
    if !matches!(
        (a.send_state, b.send_state),
        (SendState::Sent, SendState::Sent) | (SendState::Pending, SendState::Pending)
    ) {
        return false;
    }

    let (ta, tb) = (a.timestamp(), b.timestamp());
    ta.utc_day() == tb.utc_day() && ta.abs_diff(tb) <= window
}

/// Full rescan over records in store order.
pub fn compute_adjacency<'a>(
    records: impl IntoIterator<Item = &'a EventRecord>,
    window: Duration,
) -> Vec<(EventId, AdjacencyFlags)> {
    let renderable: Vec<&EventRecord> =
        records.into_iter().filter(|r| r.is_renderable()).collect();

    let mut flags = vec![AdjacencyFlags::default(); renderable.len()];
    for (i, pair) in renderable.windows(2).enumerate() {
        if connected(pair[0], pair[1], window) {
            flags[i].bottom = true;
            flags[i + 1].top = true;
        }
    }

    renderable.into_iter().map(|r| r.id.clone()).zip(flags).collect()
}

#[derive(Debug, Clone)]
struct Node {
    record: Arc<EventRecord>,
    connects_next: bool,
}

/// Incremental adjacency over the renderable records of a store.
#[derive(Debug, Clone)]
pub struct AdjacencyIndex {
    window: Duration,
    nodes: OrdMap<i64, Node>,
    slots: HashMap<EventId, i64>,
    next_front: i64,
    next_back: i64,
}

impl AdjacencyIndex {
    /// Create an empty index using `window` as the adjacency window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            nodes: OrdMap::new(),
            slots: HashMap::new(),
            next_front: -1,
            next_back: 0,
        }
    }

    /// Number of tracked renderable records.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no renderable record is tracked.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flags for one record. `None` if it is not a tracked renderable.
    pub fn flags(&self, id: &str) -> Option<AdjacencyFlags> {
        let slot = *self.slots.get(id)?;
        let node = self.nodes.get(&slot)?;
        let top = self
            .predecessor(slot)
            .and_then(|p| self.nodes.get(&p))
            .is_some_and(|p| p.connects_next);
        Some(AdjacencyFlags { top, bottom: node.connects_next })
    }

    /// Flags for all tracked records in store order.
    pub fn entries(&self) -> Vec<(EventId, AdjacencyFlags)> {
        let mut previous_connects = false;
        self.nodes
            .values()
            .map(|node| {
                let flags = AdjacencyFlags { top: previous_connects, bottom: node.connects_next };
                previous_connects = node.connects_next;
                (node.record.id.clone(), flags)
            })
            .collect()
    }

    /// Track a block that was prepended to the store, given in store order.
    pub fn prepend(&mut self, batch: &[Arc<EventRecord>]) {
        let mut added = Vec::new();
        for record in batch.iter().rev().filter(|r| r.is_renderable()) {
            let slot = self.next_front;
            self.next_front -= 1;
            self.insert_node(slot, Arc::clone(record));
            added.push(slot);
        }
        for slot in added {
            self.link_from(slot);
        }
    }

    /// Track a record appended at the tail.
    pub fn append(&mut self, record: &Arc<EventRecord>) {
        if !record.is_renderable() {
            return;
        }
        let slot = self.next_back;
        self.next_back += 1;
        self.insert_node(slot, Arc::clone(record));
        self.relink(slot);
    }

    /// Stop tracking a removed record.
    pub fn remove(&mut self, id: &str) {
        let Some(slot) = self.slots.remove(id) else {
            return;
        };
        self.nodes.remove(&slot);
        if let Some(prev) = self.predecessor(slot) {
            self.link_from(prev);
        }
    }

    /// Replace the record in `old_id`'s slot, keeping its position.
    pub fn update(&mut self, old_id: &str, record: &Arc<EventRecord>) {
        let Some(slot) = self.slots.remove(old_id) else {
            return;
        };
        if !record.is_renderable() {
            self.nodes.remove(&slot);
            if let Some(prev) = self.predecessor(slot) {
                self.link_from(prev);
            }
            return;
        }
        self.insert_node(slot, Arc::clone(record));
        self.relink(slot);
    }

    /// Discard everything and rescan `records` in store order.
    pub fn rebuild<'a>(&mut self, records: impl IntoIterator<Item = &'a Arc<EventRecord>>) {
        *self = Self::new(self.window);
        for record in records {
            self.append(record);
        }
    }

    fn insert_node(&mut self, slot: i64, record: Arc<EventRecord>) {
        self.slots.insert(record.id.clone(), slot);
        self.nodes.insert(slot, Node { record, connects_next: false });
    }

    fn predecessor(&self, slot: i64) -> Option<i64> {
        self.nodes.range(..slot).next_back().map(|(k, _)| *k)
    }

    /// Recompute the edge into and out of `slot`.
    fn relink(&mut self, slot: i64) {
        if let Some(prev) = self.predecessor(slot) {
            self.link_from(prev);
        }
        self.link_from(slot);
    }

    fn link_from(&mut self, slot: i64) {
        let window = self.window;
        let next = self
            .nodes
            .range((Excluded(slot), Unbounded))
            .next()
            .map(|(_, n)| Arc::clone(&n.record));
        if let Some(node) = self.nodes.get_mut(&slot) {
            node.connects_next = next.is_some_and(|n| connected(&node.record, &n, window));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Membership, Timestamp};

    const WINDOW: Duration = Duration::from_secs(300);

    fn msg(id: &str, sender: &str, secs: u64) -> Arc<EventRecord> {
        Arc::new(EventRecord::message(id, sender, Timestamp::from_secs(secs), "x"))
    }

    fn flags(entries: &[(EventId, AdjacencyFlags)]) -> Vec<(bool, bool)> {
        entries.iter().map(|(_, f)| (f.top, f.bottom)).collect()
    }

    #[test]
    fn same_sender_run_connects() {
        let records =
            [msg("a1", "A", 0), msg("a2", "A", 1), msg("a3", "A", 2), msg("b1", "B", 3)];
        let entries = compute_adjacency(records.iter().map(AsRef::as_ref), WINDOW);

        assert_eq!(flags(&entries), [(false, true), (true, true), (true, false), (false, false)]);
    }

    #[test]
    fn window_and_day_boundaries_break_runs() {
        let late = msg("a2", "A", 301);
        assert!(!connected(&msg("a1", "A", 0), &late, WINDOW));

        let before_midnight = msg("a3", "A", 86_399);
        let after_midnight = msg("a4", "A", 86_401);
        assert!(!connected(&before_midnight, &after_midnight, WINDOW));
    }

    #[test]
    fn membership_changes_never_connect() {
        let join = Arc::new(EventRecord::membership(
            "m1",
            "A",
            Timestamp::from_secs(1),
            "A",
            Membership::Join,
        ));
        assert!(!connected(&msg("a1", "A", 0), &join, WINDOW));
    }

    #[test]
    fn pending_and_sent_do_not_mix() {
        let sent = msg("a1", "A", 0);
        let mut pending = EventRecord::clone(&msg("~n.0", "A", 1));
        pending.send_state = SendState::Pending;
        assert!(!connected(&sent, &pending, WINDOW));

        let mut pending2 = pending.clone();
        pending2.id = EventId::new("~n.1");
        assert!(connected(&pending, &pending2, WINDOW));

        let mut failed = pending.clone();
        failed.send_state = SendState::Failed;
        assert!(!connected(&failed, &failed.clone(), WINDOW));
    }

    #[test]
    fn incremental_matches_rescan() {
        let mut index = AdjacencyIndex::new(WINDOW);
        let mut store: Vec<Arc<EventRecord>> = Vec::new();

        for record in [msg("c1", "A", 100), msg("c2", "A", 110)] {
            index.append(&record);
            store.push(record);
        }

        let batch = vec![msg("b1", "B", 50), msg("b2", "A", 90)];
        index.prepend(&batch);
        store.splice(0..0, batch);

        let tail = msg("c3", "B", 120);
        index.append(&tail);
        store.push(tail);

        index.remove("c2");
        store.retain(|r| r.id.as_str() != "c2");

        let expected = compute_adjacency(store.iter().map(AsRef::as_ref), WINDOW);
        assert_eq!(index.entries(), expected);
        assert_eq!(index.flags("b2"), Some(AdjacencyFlags { top: false, bottom: true }));
    }

    #[test]
    fn update_keeps_slot() {
        let mut index = AdjacencyIndex::new(WINDOW);
        let mut echo = EventRecord::clone(&msg("~n.0", "A", 10));
        echo.send_state = SendState::Pending;
        let echo = Arc::new(echo);

        index.append(&msg("a1", "A", 0));
        index.append(&echo);
        assert_eq!(index.flags("a1"), Some(AdjacencyFlags { top: false, bottom: false }));

        index.update("~n.0", &msg("srv1", "A", 11));
        assert_eq!(index.flags("a1"), Some(AdjacencyFlags { top: false, bottom: true }));
        assert_eq!(index.flags("srv1"), Some(AdjacencyFlags { top: true, bottom: false }));
        assert!(index.flags("~n.0").is_none());
    }
}
