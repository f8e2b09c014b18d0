//! Event records and their identifiers.
//!
//! An [`EventRecord`] is the normalized form of one protocol event plus the
//! local metadata the timeline needs for merging: how the record entered the
//! store ([`Provenance`]) and, for local sends, where it is in its lifecycle
//! ([`SendState`]).
//!
//! Payloads are owned by the external protocol. The timeline only interprets
//! the handful of shapes it reconciles (bodies, edit bodies, reaction keys,
//! redaction reasons, membership changes) and carries everything else as
//! [`Content::Unrecognized`].

use std::{borrow::Borrow, fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Milliseconds in one UTC day.
pub const MILLIS_PER_DAY: u64 = 86_400_000;

/// Opaque event identifier.
///
/// Server-assigned for confirmed events, locally generated for echoes that
/// have not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EventId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// User identifier of an event sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a raw user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Wall-clock time in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Timestamp from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Timestamp from seconds since the Unix epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// UTC day number (days since the Unix epoch).
    pub const fn utc_day(self) -> u64 {
        self.0 / MILLIS_PER_DAY
    }

    /// Absolute distance between two timestamps.
    ///
    /// Store order is not timestamp order, so either side may be the later.
    pub fn abs_diff(self, other: Self) -> Duration {
        Duration::from_millis(self.0.abs_diff(other.0))
    }
}

/// Kind of a protocol event, as far as reconciliation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Standalone chat message.
    Message,
    /// Replacement of an earlier message's body.
    Edit,
    /// Annotation (emoji key) on another event.
    Reaction,
    /// Removal of another event's content.
    Redaction,
    /// Membership transition (join, leave, invite, ...).
    MembershipChange,
    /// Anything else; carried but never rendered.
    Other,
}

/// How a relating event refers to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Edit of the target.
    Replace,
    /// Reaction on the target.
    Annotation,
    /// Redaction of the target.
    Redacts,
    /// Reply or thread reference. The referencing event still renders.
    Reference,
}

impl RelationType {
    /// Whether the relating event folds into its target instead of standing
    /// alone in the timeline.
    pub fn is_aggregating(self) -> bool {
        matches!(self, Self::Replace | Self::Annotation | Self::Redacts)
    }
}

/// Directed reference from one event to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatesTo {
    /// Event being referred to. May not be in the store (yet, or ever).
    pub target: EventId,
    /// Kind of reference.
    pub rel_type: RelationType,
}

/// Membership transition carried by a [`EventKind::MembershipChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    /// Target joined.
    Join,
    /// Target left (or was kicked).
    Leave,
    /// Target was invited.
    Invite,
    /// Target was banned.
    Ban,
    /// Target asked to join.
    Knock,
}

impl Membership {
    fn verb(self) -> &'static str {
        match self {
            Self::Join => "joined",
            Self::Leave => "left",
            Self::Invite => "was invited",
            Self::Ban => "was banned",
            Self::Knock => "asked to join",
        }
    }
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Message body.
    Message {
        /// Plain-text body.
        body: String,
    },
    /// Edit payload.
    Edit {
        /// Replacement body for the target message.
        new_body: String,
    },
    /// Reaction payload.
    Reaction {
        /// Reaction key, usually an emoji.
        key: String,
    },
    /// Redaction payload.
    Redaction {
        /// Optional human-readable reason.
        #[serde(default)]
        reason: Option<String>,
    },
    /// Membership payload.
    Membership {
        /// User whose membership changed.
        target: UserId,
        /// New membership.
        membership: Membership,
    },
    /// Payload the timeline does not interpret.
    Unrecognized {
        /// Protocol event type, kept for diagnostics.
        event_type: String,
    },
}

impl Content {
    /// Human-readable summary of a membership payload.
    pub fn membership_summary(target: &UserId, membership: Membership) -> String {
        format!("{target} {}", membership.verb())
    }
}

/// Local lifecycle of a record.
///
/// Only meaningful for locally originated records; everything the server
/// delivered is implicitly [`SendState::Sent`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    /// Submitted locally, not yet confirmed.
    Pending,
    /// Confirmed by the server.
    #[default]
    Sent,
    /// Rejected; stays until retried or discarded.
    Failed,
}

/// How a record entered the store. Merge policy only, never display order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Historical pagination.
    Backfill,
    /// Live sync.
    #[default]
    Live,
    /// Local optimistic send.
    LocalEcho,
}

/// One protocol event plus local metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event identifier.
    pub id: EventId,
    /// Event kind.
    pub kind: EventKind,
    /// Sender of the event.
    pub sender: UserId,
    /// Server-assigned time. `None` for unconfirmed echoes.
    #[serde(default)]
    pub origin_timestamp: Option<Timestamp>,
    /// Local submission time, used while `origin_timestamp` is absent.
    #[serde(default)]
    pub local_timestamp: Timestamp,
    /// Kind-specific payload.
    pub content: Content,
    /// Relation to another event, if any.
    #[serde(default)]
    pub relates_to: Option<RelatesTo>,
    /// Local send lifecycle.
    #[serde(default)]
    pub send_state: SendState,
    /// Stamped by the store on insertion.
    #[serde(default)]
    pub provenance: Provenance,
}

impl EventRecord {
    fn confirmed(
        id: impl Into<EventId>,
        kind: EventKind,
        sender: impl Into<UserId>,
        timestamp: Timestamp,
        content: Content,
        relates_to: Option<RelatesTo>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            sender: sender.into(),
            origin_timestamp: Some(timestamp),
            local_timestamp: timestamp,
            content,
            relates_to,
            send_state: SendState::Sent,
            provenance: Provenance::Live,
        }
    }

    /// Confirmed chat message.
    pub fn message(
        id: impl Into<EventId>,
        sender: impl Into<UserId>,
        timestamp: Timestamp,
        body: impl Into<String>,
    ) -> Self {
        Self::confirmed(
            id,
            EventKind::Message,
            sender,
            timestamp,
            Content::Message { body: body.into() },
            None,
        )
    }

    /// Confirmed edit of `target`.
    pub fn edit(
        id: impl Into<EventId>,
        sender: impl Into<UserId>,
        timestamp: Timestamp,
        target: impl Into<EventId>,
        new_body: impl Into<String>,
    ) -> Self {
        Self::confirmed(
            id,
            EventKind::Edit,
            sender,
            timestamp,
            Content::Edit { new_body: new_body.into() },
            Some(RelatesTo { target: target.into(), rel_type: RelationType::Replace }),
        )
    }

    /// Confirmed reaction with `key` on `target`.
    pub fn reaction(
        id: impl Into<EventId>,
        sender: impl Into<UserId>,
        timestamp: Timestamp,
        target: impl Into<EventId>,
        key: impl Into<String>,
    ) -> Self {
        Self::confirmed(
            id,
            EventKind::Reaction,
            sender,
            timestamp,
            Content::Reaction { key: key.into() },
            Some(RelatesTo { target: target.into(), rel_type: RelationType::Annotation }),
        )
    }

    /// Confirmed redaction of `target`.
    pub fn redaction(
        id: impl Into<EventId>,
        sender: impl Into<UserId>,
        timestamp: Timestamp,
        target: impl Into<EventId>,
        reason: Option<String>,
    ) -> Self {
        Self::confirmed(
            id,
            EventKind::Redaction,
            sender,
            timestamp,
            Content::Redaction { reason },
            Some(RelatesTo { target: target.into(), rel_type: RelationType::Redacts }),
        )
    }

    /// Confirmed membership change of `target`.
    pub fn membership(
        id: impl Into<EventId>,
        sender: impl Into<UserId>,
        timestamp: Timestamp,
        target: impl Into<UserId>,
        membership: Membership,
    ) -> Self {
        Self::confirmed(
            id,
            EventKind::MembershipChange,
            sender,
            timestamp,
            Content::Membership { target: target.into(), membership },
            None,
        )
    }

    /// Effective timestamp: server time if confirmed, local time otherwise.
    pub fn timestamp(&self) -> Timestamp {
        self.origin_timestamp.unwrap_or(self.local_timestamp)
    }

    /// Whether this record stands alone as a timeline entry.
    pub fn is_renderable(&self) -> bool {
        matches!(self.kind, EventKind::Message | EventKind::MembershipChange)
            && !self.relates_to.as_ref().is_some_and(|r| r.rel_type.is_aggregating())
    }

    /// Whether this record is a local echo still awaiting confirmation.
    pub fn is_pending_echo(&self) -> bool {
        self.provenance == Provenance::LocalEcho && self.send_state == SendState::Pending
    }

    /// Target of this record's relation, if any.
    pub fn target(&self) -> Option<&EventId> {
        self.relates_to.as_ref().map(|r| &r.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relations_that_aggregate_are_not_renderable() {
        let edit = EventRecord::edit("e2", "u1", Timestamp::from_secs(1), "e1", "hi!");
        assert!(!edit.is_renderable());

        let mut reply = EventRecord::message("e3", "u1", Timestamp::from_secs(2), "re");
        reply.relates_to =
            Some(RelatesTo { target: EventId::new("e1"), rel_type: RelationType::Reference });
        assert!(reply.is_renderable());

        let mut folded = EventRecord::message("e4", "u1", Timestamp::from_secs(3), "x");
        folded.relates_to =
            Some(RelatesTo { target: EventId::new("e1"), rel_type: RelationType::Replace });
        assert!(!folded.is_renderable());
    }

    #[test]
    fn timestamp_prefers_origin_over_local() {
        let mut record = EventRecord::message("e1", "u1", Timestamp::from_millis(500), "hi");
        record.local_timestamp = Timestamp::from_millis(900);
        assert_eq!(record.timestamp(), Timestamp::from_millis(500));

        record.origin_timestamp = None;
        assert_eq!(record.timestamp(), Timestamp::from_millis(900));
    }

    #[test]
    fn utc_day_boundaries() {
        assert_eq!(Timestamp::from_millis(MILLIS_PER_DAY - 1).utc_day(), 0);
        assert_eq!(Timestamp::from_millis(MILLIS_PER_DAY).utc_day(), 1);
        assert_eq!(
            Timestamp::from_secs(10).abs_diff(Timestamp::from_secs(4)),
            Duration::from_secs(6)
        );
    }

    #[test]
    fn event_id_borrows_as_str() {
        let mut ids = std::collections::HashSet::new();
        ids.insert(EventId::new("$abc"));
        assert!(ids.contains("$abc"));
    }
}
