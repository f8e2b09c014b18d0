//! Derived views over a [`TimelineSnapshot`].
//!
//! Everything here is a pure function of a snapshot and the configuration.
//! Reads never fail: unknown ids yield `None` or an empty result and payloads
//! that do not match their kind degrade to [`ContentStatus::Malformed`].
//!
//! Relating records that failed to send are ignored; pending ones count, so
//! an optimistic edit or reaction shows up immediately.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    config::TimelineConfig,
    event::{Content, EventKind, EventRecord, Membership, SendState, UserId},
    store::TimelineSnapshot,
};

/// How the resolved body of a renderable event came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentStatus {
    /// Body as originally sent.
    Original,
    /// Body from the latest edit.
    Edited,
    /// Event was redacted; the body is the tombstone.
    Redacted {
        /// Reason given by the redaction, if any.
        reason: Option<String>,
    },
    /// Payload did not match the event kind.
    Malformed,
}

/// Body to display for a renderable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    /// Text to render.
    pub body: String,
    /// Where `body` came from.
    pub status: ContentStatus,
}

impl ResolvedContent {
    fn malformed() -> Self {
        Self { body: String::new(), status: ContentStatus::Malformed }
    }

    /// Whether the event was redacted.
    pub fn is_redacted(&self) -> bool {
        matches!(self.status, ContentStatus::Redacted { .. })
    }
}

/// A standalone timeline entry with its resolved content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableEvent {
    /// The underlying record.
    pub record: Arc<EventRecord>,
    /// Content after applying edits and redactions.
    pub content: ResolvedContent,
    /// Edits in ascending timestamp order. Empty when redacted.
    pub edits: Vec<Arc<EventRecord>>,
}

/// Reactions on one target: key to the senders currently reacting with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionGroups {
    groups: BTreeMap<String, BTreeSet<UserId>>,
}

impl ReactionGroups {
    /// Senders reacting with `key`.
    pub fn senders(&self, key: &str) -> Option<&BTreeSet<UserId>> {
        self.groups.get(key)
    }

    /// Number of senders reacting with `key`.
    pub fn count(&self, key: &str) -> usize {
        self.groups.get(key).map_or(0, BTreeSet::len)
    }

    /// Whether `sender` reacts with `key`.
    pub fn contains(&self, key: &str, sender: &str) -> bool {
        self.groups.get(key).is_some_and(|s| s.contains(sender))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no reactions.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<UserId>)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Renderable records in store order with their resolved content.
pub fn renderable_sequence(
    snapshot: &TimelineSnapshot,
    config: &TimelineConfig,
) -> Vec<RenderableEvent> {
    snapshot
        .iter()
        .filter(|r| r.is_renderable())
        .map(|record| {
            let content = resolve_record(snapshot, record, config);
            let edits =
                if content.is_redacted() { Vec::new() } else { edit_chain(snapshot, record) };
            RenderableEvent { record: Arc::clone(record), content, edits }
        })
        .collect()
}

/// Resolved content of a renderable record. `None` for unknown or
/// non-renderable ids.
pub fn resolve_content(
    snapshot: &TimelineSnapshot,
    id: &str,
    config: &TimelineConfig,
) -> Option<ResolvedContent> {
    let record = snapshot.get(id).filter(|r| r.is_renderable())?;
    Some(resolve_record(snapshot, record, config))
}

/// Edits of a message in ascending timestamp order, ties in store order.
///
/// Empty when the message is redacted, unknown, or has no edits.
pub fn edit_history(snapshot: &TimelineSnapshot, id: &str) -> Vec<Arc<EventRecord>> {
    let Some(record) = snapshot.get(id).filter(|r| r.is_renderable()) else {
        return Vec::new();
    };
    if redaction_of(snapshot, id).is_some() {
        return Vec::new();
    }
    edit_chain(snapshot, record)
}

/// Current reactions on `target`, excluding redacted reactions.
pub fn reaction_groups(snapshot: &TimelineSnapshot, target: &str) -> ReactionGroups {
    let mut groups = ReactionGroups::default();

    for reaction in relating(snapshot, target, EventKind::Reaction) {
        let Content::Reaction { key } = &reaction.content else {
            continue;
        };
        if redaction_of(snapshot, reaction.id.as_str()).is_some() {
            continue;
        }
        groups.groups.entry(key.clone()).or_default().insert(reaction.sender.clone());
    }

    groups
}

/// One-line summary of the timeline for a room list.
///
/// If the latest membership change concerning `own_user` is an invite, the
/// preview names the inviter. Otherwise it is the resolved body of the last
/// message the server has delivered, or empty if there is none. Local echoes
/// that are pending or failed never preview.
pub fn last_message_preview(
    snapshot: &TimelineSnapshot,
    own_user: &UserId,
    config: &TimelineConfig,
) -> String {
    let own_membership = snapshot.iter().rev().find_map(|r| match &r.content {
        Content::Membership { target, membership } if target == own_user => {
            Some((r, *membership))
        },
        _ => None,
    });

    if let Some((invite, Membership::Invite)) = own_membership {
        return format!("Invitation from: {}", invite.sender);
    }

    snapshot
        .iter()
        .rev()
        .find(|r| {
            r.kind == EventKind::Message && r.is_renderable() && r.send_state == SendState::Sent
        })
        .map(|r| resolve_record(snapshot, r, config).body)
        .unwrap_or_default()
}

fn resolve_record(
    snapshot: &TimelineSnapshot,
    record: &EventRecord,
    config: &TimelineConfig,
) -> ResolvedContent {
    // Redaction wins over edits.
    if let Some(redaction) = redaction_of(snapshot, record.id.as_str()) {
        let reason = match &redaction.content {
            Content::Redaction { reason } => reason.clone(),
            _ => None,
        };
        return ResolvedContent {
            body: config.tombstone_body.clone(),
            status: ContentStatus::Redacted { reason },
        };
    }

    match (record.kind, &record.content) {
        (EventKind::Message, Content::Message { body }) => {
            let latest = edit_chain(snapshot, record).into_iter().rev().find_map(|edit| {
                match &edit.content {
                    Content::Edit { new_body } => Some(new_body.clone()),
                    _ => None,
                }
            });
            match latest {
                Some(body) => ResolvedContent { body, status: ContentStatus::Edited },
                None => ResolvedContent { body: body.clone(), status: ContentStatus::Original },
            }
        },
        (EventKind::MembershipChange, Content::Membership { target, membership }) => {
            ResolvedContent {
                body: Content::membership_summary(target, *membership),
                status: ContentStatus::Original,
            }
        },
        _ => ResolvedContent::malformed(),
    }
}

fn edit_chain(snapshot: &TimelineSnapshot, record: &EventRecord) -> Vec<Arc<EventRecord>> {
    if record.kind != EventKind::Message {
        return Vec::new();
    }
    let mut edits: Vec<Arc<EventRecord>> =
        relating(snapshot, record.id.as_str(), EventKind::Edit).cloned().collect();
    // Stable sort keeps store order for equal timestamps.
    edits.sort_by_key(|e| e.timestamp());
    edits
}

/// Redaction aimed at `id`, dispatched by the target's own kind: a redacted
/// message tombstones, a redacted reaction drops out of its group.
fn redaction_of<'a>(snapshot: &'a TimelineSnapshot, id: &'a str) -> Option<&'a Arc<EventRecord>> {
    relating(snapshot, id, EventKind::Redaction).next()
}

fn relating<'a>(
    snapshot: &'a TimelineSnapshot,
    target: &'a str,
    kind: EventKind,
) -> impl Iterator<Item = &'a Arc<EventRecord>> + 'a {
    snapshot
        .relations()
        .relations_of(target)
        .iter()
        .filter_map(move |id| snapshot.get(id.as_str()))
        .filter(move |r| r.kind == kind && r.send_state != SendState::Failed)
}
