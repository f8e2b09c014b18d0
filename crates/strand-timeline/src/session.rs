//! Inputs from the protocol session and pagination bookkeeping.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::event::{EventId, EventRecord};

/// Direction a live event was delivered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Newer than everything stored; appends at the tail.
    #[default]
    Forward,
    /// Older than everything stored; prepends at the head.
    Backward,
}

/// Outcome of a local send as reported by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Server accepted the send and assigned this identity.
    Confirmed(EventRecord),
    /// Server rejected the send.
    Failed,
}

/// Something the protocol session delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A page of history, oldest first.
    BackfillBatch {
        /// Request this batch answers. `None` for unsolicited loads.
        token: Option<PaginationToken>,
        /// Records in store order.
        records: Vec<EventRecord>,
    },
    /// One event from live sync.
    LiveEvent {
        /// The event.
        record: EventRecord,
        /// Transport direction tag.
        direction: Direction,
    },
    /// Result of a previously submitted send.
    SendResult {
        /// Placeholder id returned by `submit_send`.
        echo_id: EventId,
        /// What happened.
        outcome: SendOutcome,
    },
}

/// Handle for one outstanding backfill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaginationToken(u64);

impl PaginationToken {
    /// Raw token value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PaginationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// Outstanding backfill requests.
///
/// A batch is applied only if its token is still in flight; cancelling a
/// request makes its late result discardable.
#[derive(Debug, Clone, Default)]
pub struct PaginationTracker {
    next: u64,
    in_flight: HashSet<PaginationToken>,
}

impl PaginationTracker {
    /// Create a tracker with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for a new request.
    pub fn begin(&mut self) -> PaginationToken {
        let token = PaginationToken(self.next);
        self.next += 1;
        self.in_flight.insert(token);
        token
    }

    /// Abandon a request. Returns `false` if it was not in flight.
    pub fn cancel(&mut self, token: PaginationToken) -> bool {
        self.in_flight.remove(&token)
    }

    /// Mark a request answered. Returns `false` if the result should be
    /// discarded because the request was cancelled or never issued.
    pub fn complete(&mut self, token: PaginationToken) -> bool {
        self.in_flight.remove(&token)
    }

    /// Whether `token` is still awaiting its batch.
    pub fn is_in_flight(&self, token: PaginationToken) -> bool {
        self.in_flight.contains(&token)
    }

    /// Number of outstanding requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_request_is_not_completable() {
        let mut tracker = PaginationTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        assert_ne!(first, second);

        assert!(tracker.cancel(first));
        assert!(!tracker.complete(first));
        assert!(tracker.complete(second));
        assert!(!tracker.complete(second));
        assert_eq!(tracker.in_flight(), 0);
    }
}
