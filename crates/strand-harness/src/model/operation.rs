//! Operations for model-based testing.
//!
//! Operations represent everything a protocol session and a user can do to a
//! timeline. They are generated from raw bytes through `arbitrary` and
//! applied to both the model and the real implementation.

use arbitrary::Arbitrary;
use strand_timeline::{EventId, EventRecord, Membership, OutgoingPayload, Timestamp, UserId};

use crate::sim_env::SIM_EPOCH;

/// Number of distinct server event ids (`$e0` ..).
pub const ID_SPACE: u8 = 24;

/// Number of distinct senders (`@u0` ..).
pub const SENDERS: u8 = 3;

/// User the simulated timeline belongs to.
pub const OWN_USER: &str = "@u0";

const REACTION_KEYS: [&str; 3] = ["👍", "🎉", "👀"];

/// Spacing between generated timestamps. A few steps fit in the default
/// adjacency window and the range crosses one UTC day boundary.
const STEP_SECS: u64 = 120;

/// Kind of a generated server event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum SmallKind {
    /// Plain message.
    Message,
    /// Edit of `target`.
    Edit,
    /// Reaction on `target`.
    Reaction,
    /// Redaction of `target`.
    Redaction,
    /// Sender joins.
    Join,
    /// Sender invites another user.
    Invite,
}

/// Compact server event, expanded by [`SmallEvent::to_record`].
#[derive(Debug, Clone, Arbitrary)]
pub struct SmallEvent {
    /// Event id seed.
    pub id: u8,
    /// Sender seed.
    pub sender: u8,
    /// Event kind.
    pub kind: SmallKind,
    /// Target id seed for relations.
    pub target: u8,
    /// Timestamp seed.
    pub time: u8,
    /// Content seed.
    pub variant: u8,
}

impl SmallEvent {
    /// Expand into a full record.
    pub fn to_record(&self) -> EventRecord {
        let id = server_id(self.id);
        let sender = user(self.sender);
        let ts = Timestamp::from_millis(
            SIM_EPOCH.as_millis() + u64::from(self.time % 64) * STEP_SECS * 1000,
        );
        let target = server_id(self.target);

        match self.kind {
            SmallKind::Message => {
                EventRecord::message(id, sender, ts, format!("m{}", self.variant))
            },
            SmallKind::Edit => {
                EventRecord::edit(id, sender, ts, target, format!("edit{}", self.variant))
            },
            SmallKind::Reaction => {
                EventRecord::reaction(id, sender, ts, target, reaction_key(self.variant))
            },
            SmallKind::Redaction => EventRecord::redaction(id, sender, ts, target, None),
            SmallKind::Join => {
                let joiner = sender.clone();
                EventRecord::membership(id, sender, ts, joiner, Membership::Join)
            },
            SmallKind::Invite => {
                EventRecord::membership(id, sender, ts, user(self.variant), Membership::Invite)
            },
        }
    }
}

/// Operations that can be applied to a timeline.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Session delivers a page of history.
    Backfill {
        /// Records, oldest first.
        events: Vec<SmallEvent>,
    },
    /// Live sync delivers one event.
    Live {
        /// The event.
        event: SmallEvent,
    },
    /// Live sync delivers one event tagged backwards.
    LiveBackward {
        /// The event.
        event: SmallEvent,
    },
    /// User sends a text message. Some seeds produce an empty body.
    SendText {
        /// Body seed.
        variant: u8,
    },
    /// User reacts to a server event.
    SendReaction {
        /// Target id seed.
        target: u8,
        /// Key seed.
        variant: u8,
    },
    /// User edits a server event.
    SendEdit {
        /// Target id seed.
        target: u8,
        /// Body seed.
        variant: u8,
    },
    /// User redacts an event, possibly one of their own confirmed sends.
    SendRedaction {
        /// Target id seed, drawn from the confirmed id space.
        target: u8,
        /// Reason seed. Odd seeds carry a reason.
        variant: u8,
    },
    /// A stored record is deleted.
    Remove {
        /// Id seed, drawn from the confirmed id space.
        target: u8,
    },
    /// Session confirms a tracked send.
    Confirm {
        /// Index into tracked sends, in submission order.
        echo: u8,
        /// Server id seed. Even seeds reuse the `$e` space so the confirmed
        /// id can already be present from live sync.
        server_id: u8,
    },
    /// Session reports a tracked send as failed.
    Fail {
        /// Index into tracked sends.
        echo: u8,
    },
    /// User retries a tracked send.
    Retry {
        /// Index into tracked sends.
        echo: u8,
    },
    /// User discards a tracked send.
    Retract {
        /// Index into tracked sends.
        echo: u8,
    },
    /// Wall-clock time passes.
    AdvanceTime {
        /// Seconds seed.
        secs: u16,
    },
}

impl Operation {
    /// Payload for the send operations, `None` for everything else.
    pub fn payload(&self) -> Option<OutgoingPayload> {
        match self {
            Self::SendText { variant } => {
                let body = if variant % 8 == 0 { String::new() } else { format!("t{variant}") };
                Some(OutgoingPayload::Text { body })
            },
            Self::SendReaction { target, variant } => Some(OutgoingPayload::Reaction {
                target: server_id(*target),
                key: reaction_key(*variant).to_string(),
            }),
            Self::SendEdit { target, variant } => Some(OutgoingPayload::Edit {
                target: server_id(*target),
                body: format!("e{variant}"),
            }),
            Self::SendRedaction { target, variant } => Some(OutgoingPayload::Redaction {
                target: Self::confirmed_id(*target),
                reason: (variant % 2 == 1).then(|| format!("r{variant}")),
            }),
            _ => None,
        }
    }

    /// Id the server assigns on confirmation.
    pub fn confirmed_id(seed: u8) -> EventId {
        if seed % 2 == 0 { server_id(seed / 2) } else { EventId::new(format!("$s{}", seed % 8)) }
    }

    /// Clock movement for [`Operation::AdvanceTime`], in seconds.
    pub fn advance_secs(secs: u16) -> u64 {
        u64::from(secs % 900)
    }
}

/// Result of applying an operation.
pub type OperationResult = Result<(), OperationError>;

/// Why an operation was refused. Both sides must refuse the same operations
/// for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// No tracked send to address.
    NoSuchEcho,
    /// No stored record with the addressed id.
    NoSuchRecord,
    /// Tracked send is not in the state the operation needs.
    InvalidState,
    /// Send payload was refused.
    Rejected,
}

/// Record the server returns for a confirmed send.
pub fn confirmed_record(payload: &OutgoingPayload, id: EventId, now: Timestamp) -> EventRecord {
    let mut record = payload.to_echo_record(id, UserId::new(OWN_USER), now);
    record.origin_timestamp = Some(now);
    record.send_state = strand_timeline::SendState::Sent;
    record
}

/// Stable form of an id for comparison: placeholders keep only their
/// sequence number, since the nonce differs between implementations.
pub fn normalize_id(id: &EventId) -> String {
    match id.as_str().strip_prefix('~') {
        Some(rest) => format!("~{}", rest.rsplit_once('.').map_or(rest, |(_, seq)| seq)),
        None => id.to_string(),
    }
}

fn server_id(seed: u8) -> EventId {
    EventId::new(format!("$e{}", seed % ID_SPACE))
}

fn user(seed: u8) -> UserId {
    UserId::new(format!("@u{}", seed % SENDERS))
}

fn reaction_key(seed: u8) -> &'static str {
    REACTION_KEYS[usize::from(seed) % REACTION_KEYS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_normalize_to_sequence() {
        assert_eq!(normalize_id(&EventId::new("~00000000000000ab.7")), "~7");
        assert_eq!(normalize_id(&EventId::new("~m.7")), "~7");
        assert_eq!(normalize_id(&EventId::new("$e3")), "$e3");
    }

    #[test]
    fn confirmed_ids_overlap_live_space() {
        assert_eq!(Operation::confirmed_id(4), EventId::new("$e2"));
        assert_eq!(Operation::confirmed_id(3), EventId::new("$s3"));
    }

    #[test]
    fn redactions_target_confirmed_ids() {
        let op = Operation::SendRedaction { target: 3, variant: 5 };
        assert_eq!(
            op.payload(),
            Some(OutgoingPayload::Redaction {
                target: EventId::new("$s3"),
                reason: Some("r5".into()),
            })
        );
        assert!(Operation::Remove { target: 3 }.payload().is_none());
    }
}
