//! Outgoing echo manager.
//!
//! Tracks every local send from submission until it is confirmed or
//! discarded. Each send is `Pending` until the session reports an outcome;
//! `Sent` is reached only through confirmation and removes the entry, while
//! `Failed` stays until the user retries or retracts it. There is no
//! automatic retry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::TimelineError,
    event::{EventId, EventRecord, SendState, Timestamp, UserId},
};

/// Something the local user wants to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingPayload {
    /// New text message.
    Text {
        /// Message body.
        body: String,
    },
    /// Replacement body for an existing message.
    Edit {
        /// Message being edited.
        target: EventId,
        /// New body.
        body: String,
    },
    /// Reaction on an existing event.
    Reaction {
        /// Event being reacted to.
        target: EventId,
        /// Reaction key.
        key: String,
    },
    /// Redaction of an existing event.
    Redaction {
        /// Event being redacted.
        target: EventId,
        /// Optional reason.
        #[serde(default)]
        reason: Option<String>,
    },
}

impl OutgoingPayload {
    /// Event this payload relates to, if any.
    pub fn target(&self) -> Option<&EventId> {
        match self {
            Self::Text { .. } => None,
            Self::Edit { target, .. }
            | Self::Reaction { target, .. }
            | Self::Redaction { target, .. } => Some(target),
        }
    }

    fn validate(&self) -> Result<(), TimelineError> {
        match self {
            Self::Text { body } | Self::Edit { body, .. } if body.is_empty() => {
                Err(TimelineError::EmptyBody)
            },
            _ => Ok(()),
        }
    }

    /// Optimistic record shown while the send is pending.
    pub fn to_echo_record(&self, id: EventId, sender: UserId, now: Timestamp) -> EventRecord {
        let mut record = match self {
            Self::Text { body } => EventRecord::message(id, sender, now, body.as_str()),
            Self::Edit { target, body } => {
                EventRecord::edit(id, sender, now, target.clone(), body.as_str())
            },
            Self::Reaction { target, key } => {
                EventRecord::reaction(id, sender, now, target.clone(), key.as_str())
            },
            Self::Redaction { target, reason } => {
                EventRecord::redaction(id, sender, now, target.clone(), reason.clone())
            },
        };
        record.origin_timestamp = None;
        record.send_state = SendState::Pending;
        record
    }
}

/// One tracked local send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoEntry {
    /// What was submitted.
    pub payload: OutgoingPayload,
    /// `Pending` or `Failed`; confirmed entries are dropped.
    pub state: SendState,
    /// Local time of submission.
    pub submitted_at: Timestamp,
    seq: u64,
}

/// Local sends awaiting an outcome, keyed by placeholder id.
#[derive(Debug, Clone)]
pub struct OutgoingEchoManager {
    nonce: u64,
    next_seq: u64,
    entries: HashMap<EventId, EchoEntry>,
}

impl OutgoingEchoManager {
    /// Create a manager whose placeholder ids embed `nonce`.
    pub fn new(nonce: u64) -> Self {
        Self { nonce, next_seq: 0, entries: HashMap::new() }
    }

    /// Number of tracked sends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked send by placeholder id.
    pub fn get(&self, id: &str) -> Option<&EchoEntry> {
        self.entries.get(id)
    }

    /// State of a tracked send.
    pub fn state(&self, id: &str) -> Option<SendState> {
        self.entries.get(id).map(|e| e.state)
    }

    /// Tracked sends in submission order.
    pub fn entries(&self) -> Vec<(&EventId, &EchoEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
    }

    /// Register a new send and allocate its placeholder id.
    ///
    /// Rejects empty bodies and relations aimed at another unconfirmed send.
    pub fn submit(
        &mut self,
        payload: OutgoingPayload,
        now: Timestamp,
    ) -> Result<EventId, TimelineError> {
        payload.validate()?;
        if let Some(target) = payload.target() {
            if self.entries.contains_key(target) {
                return Err(TimelineError::TargetNotConfirmed(target.clone()));
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let id = EventId::new(format!("~{:016x}.{seq}", self.nonce));
        self.entries.insert(
            id.clone(),
            EchoEntry { payload, state: SendState::Pending, submitted_at: now, seq },
        );
        Ok(id)
    }

    /// Retire a pending send that the server confirmed.
    pub fn confirm(&mut self, id: &str) -> Result<EchoEntry, TimelineError> {
        self.expect_state(id, SendState::Pending)?;
        self.entries.remove(id).ok_or_else(|| TimelineError::UnknownEcho(EventId::new(id)))
    }

    /// Mark a pending send as failed.
    pub fn fail(&mut self, id: &str) -> Result<(), TimelineError> {
        self.expect_state(id, SendState::Pending)?;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.state = SendState::Failed;
        }
        Ok(())
    }

    /// Remove a failed send so it can be resubmitted.
    pub fn take_failed(&mut self, id: &str) -> Result<EchoEntry, TimelineError> {
        self.expect_state(id, SendState::Failed)?;
        self.entries.remove(id).ok_or_else(|| TimelineError::UnknownEcho(EventId::new(id)))
    }

    /// Drop a send in either state.
    pub fn retract(&mut self, id: &str) -> Result<EchoEntry, TimelineError> {
        self.entries.remove(id).ok_or_else(|| TimelineError::UnknownEcho(EventId::new(id)))
    }

    /// Check a send's state without touching it.
    pub fn expect_state(&self, id: &str, expected: SendState) -> Result<(), TimelineError> {
        let entry =
            self.entries.get(id).ok_or_else(|| TimelineError::UnknownEcho(EventId::new(id)))?;
        if entry.state != expected {
            return Err(TimelineError::InvalidEchoState {
                id: EventId::new(id),
                actual: entry.state,
                expected,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::Provenance;

    fn text(body: &str) -> OutgoingPayload {
        OutgoingPayload::Text { body: body.into() }
    }

    #[test]
    fn placeholders_are_unique_and_tagged() {
        let mut echoes = OutgoingEchoManager::new(0xab);
        let a = echoes.submit(text("a"), Timestamp::from_secs(1)).unwrap();
        let b = echoes.submit(text("b"), Timestamp::from_secs(1)).unwrap();

        assert_eq!(a.as_str(), "~00000000000000ab.0");
        assert_eq!(b.as_str(), "~00000000000000ab.1");
        let order: Vec<_> = echoes.entries().into_iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(order, [a, b]);
    }

    #[test]
    fn empty_bodies_are_rejected() {
        let mut echoes = OutgoingEchoManager::new(1);
        assert_eq!(echoes.submit(text(""), Timestamp::default()), Err(TimelineError::EmptyBody));

        let edit = OutgoingPayload::Edit { target: EventId::new("e1"), body: String::new() };
        assert_eq!(echoes.submit(edit, Timestamp::default()), Err(TimelineError::EmptyBody));
        assert!(echoes.is_empty());
    }

    #[test]
    fn relating_to_unconfirmed_send_is_rejected() {
        let mut echoes = OutgoingEchoManager::new(1);
        let id = echoes.submit(text("hi"), Timestamp::default()).unwrap();

        let reaction = OutgoingPayload::Reaction { target: id.clone(), key: "👍".into() };
        assert_eq!(
            echoes.submit(reaction, Timestamp::default()),
            Err(TimelineError::TargetNotConfirmed(id))
        );
    }

    #[test]
    fn lifecycle_transitions() {
        let mut echoes = OutgoingEchoManager::new(1);
        let id = echoes.submit(text("hi"), Timestamp::default()).unwrap();

        assert!(matches!(
            echoes.take_failed(id.as_str()),
            Err(TimelineError::InvalidEchoState { .. })
        ));
        echoes.fail(id.as_str()).unwrap();
        assert_eq!(echoes.state(id.as_str()), Some(SendState::Failed));
        assert!(matches!(echoes.confirm(id.as_str()), Err(TimelineError::InvalidEchoState { .. })));

        let entry = echoes.take_failed(id.as_str()).unwrap();
        assert_eq!(entry.payload, text("hi"));
        assert!(matches!(echoes.retract(id.as_str()), Err(TimelineError::UnknownEcho(_))));
    }

    #[test]
    fn echo_record_is_pending_without_origin_time() {
        let payload = OutgoingPayload::Reaction { target: EventId::new("e1"), key: "👍".into() };
        let record =
            payload.to_echo_record("~1.0".into(), UserId::new("u1"), Timestamp::from_secs(7));

        assert_eq!(record.origin_timestamp, None);
        assert_eq!(record.timestamp(), Timestamp::from_secs(7));
        assert_eq!(record.send_state, SendState::Pending);
        assert_eq!(record.provenance, Provenance::Live);
        assert_eq!(record.target().map(EventId::as_str), Some("e1"));
    }
}
