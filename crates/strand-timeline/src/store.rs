//! Ordered, deduplicated event store.
//!
//! The store is the only holder of canonical order. Backfill batches are
//! prepended as one contiguous block, live records and local echoes append at
//! the tail. Every id appears at most once; inserting an id that is already
//! present is a defined no-op because pagination overlap and sync replay are
//! expected, not faults.
//!
//! # Snapshots
//!
//! Records, the id map and the relation index are persistent collections
//! from `imbl`. [`TimelineStore::snapshot`] is a constant-time clone, and a
//! mutation made while a reader holds a snapshot copies only the touched
//! path, so a live insert stays logarithmic however many views are alive.
//! A batch is applied in full before it becomes visible.

use std::{collections::HashSet, sync::Arc};

use imbl::{HashMap, Vector};

use crate::{
    error::TimelineError,
    event::{EventId, EventRecord, Provenance, SendState},
    relation::RelationIndex,
};

/// Result of an insert.
#[derive(Debug, Clone, Default)]
pub struct InsertOutcome {
    /// Records that were added, in store order.
    pub inserted: Vec<Arc<EventRecord>>,
    /// Records dropped because their id was already present.
    pub duplicates: usize,
}

impl InsertOutcome {
    /// Whether nothing was added.
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty()
    }
}

/// Result of replacing an echo with its confirmed record.
#[derive(Debug, Clone)]
pub struct ResolvedEcho {
    /// The echo as it was before confirmation.
    pub echo: Arc<EventRecord>,
    /// The confirmed record now occupying the echo's slot.
    pub confirmed: Arc<EventRecord>,
    /// A copy of the confirmed record that arrived through live sync before
    /// the send result and has been dropped in favour of the echo's slot.
    pub superseded: Option<Arc<EventRecord>>,
}

/// Immutable, consistent view of the store.
///
/// Never changes after creation; later mutations are invisible to it.
#[derive(Debug, Clone, Default)]
pub struct TimelineSnapshot {
    version: u64,
    records: Vector<Arc<EventRecord>>,
    by_id: HashMap<EventId, Arc<EventRecord>>,
    relations: RelationIndex,
}

impl TimelineSnapshot {
    /// Store version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store was empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in store order.
    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = &Arc<EventRecord>> + ExactSizeIterator {
        self.records.iter()
    }

    /// Record by id.
    pub fn get(&self, id: &str) -> Option<&Arc<EventRecord>> {
        self.by_id.get(id)
    }

    /// Whether a record with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Store position of a record.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().rposition(|r| r.id.as_str() == id)
    }

    /// Relation index matching this snapshot.
    pub fn relations(&self) -> &RelationIndex {
        &self.relations
    }
}

/// Ordered, deduplicated sequence of records plus its relation index.
#[derive(Debug, Clone, Default)]
pub struct TimelineStore {
    records: Vector<Arc<EventRecord>>,
    by_id: HashMap<EventId, Arc<EventRecord>>,
    relations: RelationIndex,
    version: u64,
}

impl TimelineStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Monotonic counter bumped by every mutation that changed something.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record by id.
    pub fn get(&self, id: &str) -> Option<&Arc<EventRecord>> {
        self.by_id.get(id)
    }

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            version: self.version,
            records: self.records.clone(),
            by_id: self.by_id.clone(),
            relations: self.relations.clone(),
        }
    }

    /// Prepend a backfill batch as one block, preserving its order.
    ///
    /// Records whose id is already stored, or repeated within the batch, are
    /// dropped (first occurrence wins).
    pub fn insert_backward(
        &mut self,
        batch: impl IntoIterator<Item = EventRecord>,
    ) -> InsertOutcome {
        let mut seen = HashSet::new();
        let mut outcome = InsertOutcome::default();

        for mut record in batch {
            if self.by_id.contains_key(&record.id) || !seen.insert(record.id.clone()) {
                outcome.duplicates += 1;
                continue;
            }
            record.provenance = Provenance::Backfill;
            record.send_state = SendState::Sent;
            outcome.inserted.push(Arc::new(record));
        }

        if outcome.is_noop() {
            return outcome;
        }

        let mut records: Vector<Arc<EventRecord>> = outcome.inserted.iter().cloned().collect();
        records.append(std::mem::take(&mut self.records));
        self.records = records;

        for record in &outcome.inserted {
            self.by_id.insert(record.id.clone(), Arc::clone(record));
        }

        self.relations.prepend_batch(&outcome.inserted);
        self.version += 1;

        outcome
    }

    /// Append a live record at the tail. No-op if the id is present.
    pub fn insert_forward(&mut self, mut record: EventRecord) -> InsertOutcome {
        record.provenance = Provenance::Live;
        record.send_state = SendState::Sent;
        self.push_back(record)
    }

    /// Append a local echo at the tail.
    ///
    /// The placeholder id is unique for the store's lifetime, so the
    /// duplicate branch only guards against a misbehaving id generator.
    pub fn append_echo(&mut self, mut record: EventRecord) -> InsertOutcome {
        record.provenance = Provenance::LocalEcho;
        record.send_state = SendState::Pending;
        self.push_back(record)
    }

    /// Give a pending echo its confirmed identity, keeping its slot.
    ///
    /// If live sync already delivered the confirmed id, that copy is dropped
    /// so the id stays unique and the echo's position wins.
    pub fn resolve_echo(
        &mut self,
        placeholder: &str,
        mut confirmed: EventRecord,
    ) -> Result<ResolvedEcho, TimelineError> {
        let echo = self.pending_echo(placeholder)?;

        confirmed.provenance = Provenance::LocalEcho;
        confirmed.send_state = SendState::Sent;

        let superseded =
            if confirmed.id == echo.id { None } else { self.detach(confirmed.id.as_str()) };

        let position = self
            .position(placeholder)
            .ok_or_else(|| TimelineError::UnknownEcho(echo.id.clone()))?;
        let confirmed = Arc::new(confirmed);

        self.records.set(position, Arc::clone(&confirmed));
        self.by_id.remove(placeholder);
        self.by_id.insert(confirmed.id.clone(), Arc::clone(&confirmed));

        if !self.relations.replace(&echo, &confirmed) {
            self.relations.remove(&echo);
            if let Some(target) = confirmed.target() {
                self.relations.rebuild_target(target, self.records.iter().map(AsRef::as_ref));
            }
        }

        self.version += 1;
        Ok(ResolvedEcho { echo, confirmed, superseded })
    }

    /// Mark a pending echo as failed. The record stays in place.
    pub fn fail_echo(&mut self, placeholder: &str) -> Result<Arc<EventRecord>, TimelineError> {
        let echo = self.pending_echo(placeholder)?;
        let position = self
            .position(placeholder)
            .ok_or_else(|| TimelineError::UnknownEcho(echo.id.clone()))?;

        let mut failed = EventRecord::clone(&echo);
        failed.send_state = SendState::Failed;
        let failed = Arc::new(failed);

        self.records.set(position, Arc::clone(&failed));
        self.by_id.insert(failed.id.clone(), Arc::clone(&failed));

        self.version += 1;
        Ok(failed)
    }

    /// Delete a record and prune it from the relation index.
    pub fn remove(&mut self, id: &str) -> Result<Arc<EventRecord>, TimelineError> {
        self.detach(id).ok_or_else(|| TimelineError::NotFound(EventId::new(id)))
    }

    fn push_back(&mut self, record: EventRecord) -> InsertOutcome {
        if self.by_id.contains_key(&record.id) {
            return InsertOutcome { inserted: Vec::new(), duplicates: 1 };
        }

        let record = Arc::new(record);
        self.records.push_back(Arc::clone(&record));
        self.by_id.insert(record.id.clone(), Arc::clone(&record));
        self.relations.append(&record);
        self.version += 1;

        InsertOutcome { inserted: vec![record], duplicates: 0 }
    }

    fn detach(&mut self, id: &str) -> Option<Arc<EventRecord>> {
        let position = self.position(id)?;
        let record = self.records.remove(position);
        self.by_id.remove(id);
        self.relations.remove(&record);
        self.version += 1;
        Some(record)
    }

    fn pending_echo(&self, placeholder: &str) -> Result<Arc<EventRecord>, TimelineError> {
        let echo = self
            .by_id
            .get(placeholder)
            .filter(|r| r.provenance == Provenance::LocalEcho)
            .ok_or_else(|| TimelineError::UnknownEcho(EventId::new(placeholder)))?;

        if echo.send_state != SendState::Pending {
            return Err(TimelineError::InvalidEchoState {
                id: echo.id.clone(),
                actual: echo.send_state,
                expected: SendState::Pending,
            });
        }

        Ok(Arc::clone(echo))
    }

    fn position(&self, id: &str) -> Option<usize> {
        // Echoes and recent live records sit near the tail.
        self.records.iter().rposition(|r| r.id.as_str() == id)
    }
}
