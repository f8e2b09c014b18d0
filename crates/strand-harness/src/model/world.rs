//! Reference model of a timeline.
//!
//! Deliberately naive: a flat vector scanned on every query, no indices, no
//! copy-on-write. Each derived view is recomputed from scratch so the model
//! stays obviously correct and can be compared against the incremental
//! implementation.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    time::Duration,
};

use strand_timeline::{
    Content, DEFAULT_ADJACENCY_WINDOW, EventId, EventKind, EventRecord, Membership,
    OutgoingPayload, Provenance, SendState, Timestamp, UserId,
};

use super::operation::{
    OWN_USER, Operation, OperationError, OperationResult, confirmed_record, normalize_id,
};
use crate::sim_env::SIM_EPOCH;

/// One renderable entry as a reader sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    /// Normalized id.
    pub id: String,
    /// Resolved body.
    pub body: String,
    /// Whether the entry is tombstoned.
    pub redacted: bool,
    /// Number of applied edits.
    pub edits: usize,
    /// Reaction keys with their sorted senders.
    pub reactions: Vec<(String, Vec<String>)>,
    /// Connects to the previous entry.
    pub top: bool,
    /// Connects to the next entry.
    pub bottom: bool,
}

/// Everything observable about a timeline, in a form both implementations
/// can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Stored records in order, with their send state.
    pub records: Vec<(String, SendState)>,
    /// Tracked sends in submission order.
    pub echoes: Vec<(String, SendState)>,
    /// Renderable sequence with derived views.
    pub rendered: Vec<RenderedEntry>,
    /// Room-list preview for [`OWN_USER`].
    pub preview: String,
}

#[derive(Debug, Clone)]
struct ModelEcho {
    id: EventId,
    payload: OutgoingPayload,
    failed: bool,
}

/// Vector-backed timeline model.
#[derive(Debug, Clone)]
pub struct ModelTimeline {
    records: Vec<EventRecord>,
    echoes: Vec<ModelEcho>,
    next_seq: u64,
    now: Timestamp,
    window: Duration,
}

impl Default for ModelTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelTimeline {
    /// Empty model at [`SIM_EPOCH`] with the default adjacency window.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            echoes: Vec::new(),
            next_seq: 0,
            now: SIM_EPOCH,
            window: DEFAULT_ADJACENCY_WINDOW,
        }
    }

    /// Apply an operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Backfill { events } => {
                self.prepend(events.iter().map(|e| e.to_record()).collect());
                Ok(())
            },
            Operation::LiveBackward { event } => {
                self.prepend(vec![event.to_record()]);
                Ok(())
            },
            Operation::Live { event } => {
                let mut record = event.to_record();
                if !self.contains(&record.id) {
                    record.provenance = Provenance::Live;
                    record.send_state = SendState::Sent;
                    self.records.push(record);
                }
                Ok(())
            },
            Operation::SendText { .. }
            | Operation::SendReaction { .. }
            | Operation::SendEdit { .. }
            | Operation::SendRedaction { .. } => {
                match op.payload() {
                    Some(payload) => self.submit(payload),
                    None => Err(OperationError::Rejected),
                }
            },
            Operation::Remove { target } => {
                let id = Operation::confirmed_id(*target);
                let position = self
                    .records
                    .iter()
                    .position(|r| r.id == id)
                    .ok_or(OperationError::NoSuchRecord)?;
                self.records.remove(position);
                Ok(())
            },
            Operation::Confirm { echo, server_id } => {
                let index = self.echo_index(*echo)?;
                if self.echoes[index].failed {
                    return Err(OperationError::InvalidState);
                }
                let echo = self.echoes.remove(index);
                let confirmed_id = Operation::confirmed_id(*server_id);
                let mut confirmed = confirmed_record(&echo.payload, confirmed_id.clone(), self.now);
                confirmed.provenance = Provenance::LocalEcho;

                self.records.retain(|r| r.id != confirmed_id || r.id == echo.id);
                if let Some(slot) = self.records.iter_mut().find(|r| r.id == echo.id) {
                    *slot = confirmed;
                }
                Ok(())
            },
            Operation::Fail { echo } => {
                let index = self.echo_index(*echo)?;
                if self.echoes[index].failed {
                    return Err(OperationError::InvalidState);
                }
                self.echoes[index].failed = true;
                let id = self.echoes[index].id.clone();
                if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
                    record.send_state = SendState::Failed;
                }
                Ok(())
            },
            Operation::Retry { echo } => {
                let index = self.echo_index(*echo)?;
                if !self.echoes[index].failed {
                    return Err(OperationError::InvalidState);
                }
                let echo = self.echoes.remove(index);
                self.records.retain(|r| r.id != echo.id);
                self.submit(echo.payload)
            },
            Operation::Retract { echo } => {
                let index = self.echo_index(*echo)?;
                let echo = self.echoes.remove(index);
                self.records.retain(|r| r.id != echo.id);
                Ok(())
            },
            Operation::AdvanceTime { secs } => {
                self.now = Timestamp::from_millis(
                    self.now.as_millis() + Operation::advance_secs(*secs) * 1000,
                );
                Ok(())
            },
        }
    }

    /// Observable state of the model.
    pub fn observable_state(&self) -> ObservableState {
        let renderable: Vec<&EventRecord> =
            self.records.iter().filter(|r| r.is_renderable()).collect();

        let mut rendered: Vec<RenderedEntry> = renderable
            .iter()
            .map(|record| {
                let redacted = self.is_redacted(&record.id);
                RenderedEntry {
                    id: normalize_id(&record.id),
                    body: self.resolved_body(record),
                    redacted,
                    edits: if redacted { 0 } else { self.edits_of(record).len() },
                    reactions: self.reactions_on(&record.id),
                    top: false,
                    bottom: false,
                }
            })
            .collect();

        for i in 1..renderable.len() {
            if connects(renderable[i - 1], renderable[i], self.window) {
                rendered[i - 1].bottom = true;
                rendered[i].top = true;
            }
        }

        ObservableState {
            records: self.records.iter().map(|r| (normalize_id(&r.id), r.send_state)).collect(),
            echoes: self
                .echoes
                .iter()
                .map(|e| {
                    let state = if e.failed { SendState::Failed } else { SendState::Pending };
                    (normalize_id(&e.id), state)
                })
                .collect(),
            rendered,
            preview: self.preview(),
        }
    }

    fn prepend(&mut self, batch: Vec<EventRecord>) {
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for mut record in batch {
            if self.contains(&record.id) || !seen.insert(record.id.clone()) {
                continue;
            }
            record.provenance = Provenance::Backfill;
            record.send_state = SendState::Sent;
            fresh.push(record);
        }
        fresh.append(&mut self.records);
        self.records = fresh;
    }

    fn submit(&mut self, payload: OutgoingPayload) -> OperationResult {
        let empty = match &payload {
            OutgoingPayload::Text { body } | OutgoingPayload::Edit { body, .. } => body.is_empty(),
            _ => false,
        };
        if empty {
            return Err(OperationError::Rejected);
        }

        let id = EventId::new(format!("~m.{}", self.next_seq));
        self.next_seq += 1;

        let mut record = payload.to_echo_record(id.clone(), UserId::new(OWN_USER), self.now);
        record.provenance = Provenance::LocalEcho;
        record.send_state = SendState::Pending;
        self.records.push(record);
        self.echoes.push(ModelEcho { id, payload, failed: false });
        Ok(())
    }

    fn echo_index(&self, seed: u8) -> Result<usize, OperationError> {
        if self.echoes.is_empty() {
            return Err(OperationError::NoSuchEcho);
        }
        Ok(usize::from(seed) % self.echoes.len())
    }

    fn contains(&self, id: &EventId) -> bool {
        self.records.iter().any(|r| &r.id == id)
    }

    fn relating<'a>(
        &'a self,
        target: &'a EventId,
        kind: EventKind,
    ) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.records.iter().filter(move |r| {
            r.kind == kind && r.send_state != SendState::Failed && r.target() == Some(target)
        })
    }

    fn is_redacted(&self, id: &EventId) -> bool {
        self.relating(id, EventKind::Redaction).next().is_some()
    }

    fn edits_of<'a>(&'a self, record: &'a EventRecord) -> Vec<&'a EventRecord> {
        if record.kind != EventKind::Message {
            return Vec::new();
        }
        let mut edits: Vec<&EventRecord> = self.relating(&record.id, EventKind::Edit).collect();
        edits.sort_by_key(|e| e.timestamp());
        edits
    }

    fn resolved_body(&self, record: &EventRecord) -> String {
        if self.is_redacted(&record.id) {
            return String::new();
        }
        match &record.content {
            Content::Message { body } => {
                let latest = self.edits_of(record).into_iter().rev().find_map(|e| match &e.content {
                    Content::Edit { new_body } => Some(new_body.clone()),
                    _ => None,
                });
                latest.unwrap_or_else(|| body.clone())
            },
            Content::Membership { target, membership } => {
                Content::membership_summary(target, *membership)
            },
            _ => String::new(),
        }
    }

    fn reactions_on(&self, target: &EventId) -> Vec<(String, Vec<String>)> {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for reaction in self.relating(target, EventKind::Reaction) {
            if self.is_redacted(&reaction.id) {
                continue;
            }
            if let Content::Reaction { key } = &reaction.content {
                groups.entry(key.clone()).or_default().insert(reaction.sender.to_string());
            }
        }
        groups.into_iter().map(|(key, senders)| (key, senders.into_iter().collect())).collect()
    }

    fn preview(&self) -> String {
        let own = UserId::new(OWN_USER);
        let own_membership = self.records.iter().rev().find_map(|r| match &r.content {
            Content::Membership { target, membership } if *target == own => Some((r, *membership)),
            _ => None,
        });
        if let Some((invite, Membership::Invite)) = own_membership {
            return format!("Invitation from: {}", invite.sender);
        }

        self.records
            .iter()
            .rev()
            .find(|r| {
                r.kind == EventKind::Message
                    && r.is_renderable()
                    && r.send_state == SendState::Sent
            })
            .map(|r| self.resolved_body(r))
            .unwrap_or_default()
    }
}

fn connects(a: &EventRecord, b: &EventRecord, window: Duration) -> bool {
    let membership = EventKind::MembershipChange;
    let same_state = matches!(
        (a.send_state, b.send_state),
        (SendState::Sent, SendState::Sent) | (SendState::Pending, SendState::Pending)
    );
    let (ta, tb) = (a.timestamp().as_millis(), b.timestamp().as_millis());

    a.kind != membership
        && b.kind != membership
        && a.sender == b.sender
        && same_state
        && ta / 86_400_000 == tb / 86_400_000
        && Duration::from_millis(ta.abs_diff(tb)) <= window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SmallEvent, SmallKind};

    fn message(id: u8, time: u8) -> SmallEvent {
        SmallEvent { id, sender: 1, kind: SmallKind::Message, target: 0, time, variant: id }
    }

    #[test]
    fn backfill_prepends_and_dedups() {
        let mut model = ModelTimeline::new();
        model.apply(&Operation::Live { event: message(3, 0) }).ok();
        model
            .apply(&Operation::Backfill {
                events: vec![message(1, 0), message(2, 1), message(3, 2)],
            })
            .ok();

        let ids: Vec<String> =
            model.observable_state().records.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["$e1", "$e2", "$e3"]);
    }

    #[test]
    fn echo_operations_need_a_tracked_send() {
        let mut model = ModelTimeline::new();
        assert_eq!(model.apply(&Operation::Fail { echo: 0 }), Err(OperationError::NoSuchEcho));
        assert_eq!(model.apply(&Operation::SendText { variant: 8 }), Err(OperationError::Rejected));

        model.apply(&Operation::SendText { variant: 1 }).ok();
        assert_eq!(model.apply(&Operation::Retry { echo: 0 }), Err(OperationError::InvalidState));
        assert_eq!(model.apply(&Operation::Fail { echo: 0 }), Ok(()));
        assert_eq!(model.apply(&Operation::Retry { echo: 0 }), Ok(()));

        let state = model.observable_state();
        assert_eq!(state.echoes, vec![("~1".to_string(), SendState::Pending)]);
    }
}
