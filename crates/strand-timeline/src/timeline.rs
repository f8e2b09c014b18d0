//! Single-writer timeline state machine.
//!
//! [`Timeline`] owns the store, the echo manager, the adjacency index and the
//! pagination tracker, and applies every mutation to all of them in one step.
//! It performs no I/O: session input goes in through [`Timeline::handle`] and
//! the mutation methods, and what the caller must act on accumulates as
//! [`TimelineUpdate`]s drained with [`Timeline::take_updates`].
//!
//! # Invariants
//!
//! - Every id appears at most once in the store.
//! - The echo manager tracks exactly the store's local echoes that are
//!   `Pending` or `Failed`.
//! - The adjacency index equals a full rescan of the store.

use std::sync::Arc;

use crate::{
    adjacency::AdjacencyIndex,
    config::TimelineConfig,
    echo::{OutgoingEchoManager, OutgoingPayload},
    env::Environment,
    error::{ConfigError, TimelineError},
    event::{EventId, EventRecord, SendState, UserId},
    session::{Direction, PaginationToken, PaginationTracker, SendOutcome, SessionEvent},
    store::{InsertOutcome, TimelineSnapshot, TimelineStore},
    view::TimelineView,
};

/// Output of a timeline mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineUpdate {
    /// State changed; readers should pick up a new view.
    Changed {
        /// Store version after the change.
        version: u64,
    },
    /// A local send was accepted and must be handed to the session.
    DispatchSend {
        /// Placeholder id to report the outcome against.
        echo_id: EventId,
        /// What to send.
        payload: OutgoingPayload,
    },
    /// A local send failed and is now waiting for retry or retraction.
    SendFailed {
        /// Placeholder id of the failed send.
        echo_id: EventId,
    },
    /// A backfill batch arrived for a cancelled or unknown request.
    BatchDiscarded {
        /// Token the batch carried.
        token: PaginationToken,
    },
}

/// Timeline reconciliation state machine.
pub struct Timeline<E: Environment> {
    env: E,
    config: Arc<TimelineConfig>,
    own_user: UserId,
    store: TimelineStore,
    echoes: OutgoingEchoManager,
    adjacency: AdjacencyIndex,
    pagination: PaginationTracker,
    updates: Vec<TimelineUpdate>,
}

impl<E: Environment> Timeline<E> {
    /// Create an empty timeline for `own_user`.
    pub fn new(
        env: E,
        own_user: impl Into<UserId>,
        config: TimelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let echoes = OutgoingEchoManager::new(env.random_u64());
        let adjacency = AdjacencyIndex::new(config.adjacency_window);

        Ok(Self {
            env,
            config: Arc::new(config),
            own_user: own_user.into(),
            store: TimelineStore::new(),
            echoes,
            adjacency,
            pagination: PaginationTracker::new(),
            updates: Vec::new(),
        })
    }

    /// User the timeline belongs to.
    pub fn own_user(&self) -> &UserId {
        &self.own_user
    }

    /// Active configuration.
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Store version.
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// Snapshot of the store.
    pub fn snapshot(&self) -> TimelineSnapshot {
        self.store.snapshot()
    }

    /// Immutable view for readers.
    pub fn view(&self) -> TimelineView {
        TimelineView::new(
            self.store.snapshot(),
            self.adjacency.clone(),
            Arc::clone(&self.config),
            self.own_user.clone(),
        )
    }

    /// Local sends awaiting an outcome.
    pub fn echoes(&self) -> &OutgoingEchoManager {
        &self.echoes
    }

    /// State of a local send.
    pub fn echo_state(&self, echo_id: &str) -> Option<SendState> {
        self.echoes.state(echo_id)
    }

    /// Outstanding backfill requests.
    pub fn pagination(&self) -> &PaginationTracker {
        &self.pagination
    }

    /// Drain accumulated updates.
    pub fn take_updates(&mut self) -> Vec<TimelineUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Apply one session event.
    ///
    /// Errors are ordering faults from the session (a result for an echo that
    /// was already retracted, a duplicate result) and leave state untouched.
    pub fn handle(&mut self, event: SessionEvent) -> Result<(), TimelineError> {
        let result = match event {
            SessionEvent::BackfillBatch { token, records } => {
                if let Some(token) = token {
                    if !self.pagination.complete(token) {
                        tracing::debug!(
                            %token,
                            records = records.len(),
                            "discarding backfill for cancelled request"
                        );
                        self.updates.push(TimelineUpdate::BatchDiscarded { token });
                        return Ok(());
                    }
                }
                self.insert_backward(records);
                Ok(())
            },
            SessionEvent::LiveEvent { record, direction: Direction::Forward } => {
                self.insert_forward(record);
                Ok(())
            },
            SessionEvent::LiveEvent { record, direction: Direction::Backward } => {
                self.insert_backward(vec![record]);
                Ok(())
            },
            SessionEvent::SendResult { echo_id, outcome: SendOutcome::Confirmed(record) } => {
                self.resolve_echo(echo_id.as_str(), record)
            },
            SessionEvent::SendResult { echo_id, outcome: SendOutcome::Failed } => {
                self.fail_echo(echo_id.as_str())
            },
        };

        if let Err(e) = &result {
            if e.is_ordering_fault() {
                tracing::warn!(error = %e, "session delivered out-of-order send result");
            }
        }
        result
    }

    /// Prepend a backfill batch.
    pub fn insert_backward(&mut self, records: Vec<EventRecord>) -> InsertOutcome {
        let outcome = self.store.insert_backward(records);
        if outcome.duplicates > 0 {
            tracing::debug!(duplicates = outcome.duplicates, "dropped duplicate backfill records");
        }
        if !outcome.is_noop() {
            self.adjacency.prepend(&outcome.inserted);
            tracing::debug!(inserted = outcome.inserted.len(), "applied backfill batch");
            self.changed();
        }
        outcome
    }

    /// Append a live record.
    pub fn insert_forward(&mut self, record: EventRecord) -> InsertOutcome {
        let id = record.id.clone();
        let outcome = self.store.insert_forward(record);
        match outcome.inserted.first() {
            Some(inserted) => {
                self.adjacency.append(inserted);
                self.changed();
            },
            None => tracing::debug!(%id, "dropped duplicate live record"),
        }
        outcome
    }

    /// Submit a local send and show it optimistically.
    ///
    /// Returns the placeholder id the session must report the outcome
    /// against. A [`TimelineUpdate::DispatchSend`] carries the payload out.
    pub fn submit_send(&mut self, payload: OutgoingPayload) -> Result<EventId, TimelineError> {
        let now = self.env.now();
        let echo_id = self.echoes.submit(payload.clone(), now)?;
        let record = payload.to_echo_record(echo_id.clone(), self.own_user.clone(), now);

        let outcome = self.store.append_echo(record);
        if let Some(echo) = outcome.inserted.first() {
            self.adjacency.append(echo);
        }

        tracing::debug!(%echo_id, "submitted local echo");
        self.updates.push(TimelineUpdate::DispatchSend { echo_id: echo_id.clone(), payload });
        self.changed();
        Ok(echo_id)
    }

    /// Replace a pending echo with its confirmed record.
    pub fn resolve_echo(
        &mut self,
        echo_id: &str,
        confirmed: EventRecord,
    ) -> Result<(), TimelineError> {
        self.echoes.expect_state(echo_id, SendState::Pending)?;
        let resolved = self.store.resolve_echo(echo_id, confirmed)?;
        self.echoes.confirm(echo_id)?;

        if let Some(superseded) = &resolved.superseded {
            tracing::debug!(id = %superseded.id, "confirmed record arrived before send result");
            self.adjacency.remove(superseded.id.as_str());
        }
        if resolved.echo.is_renderable() == resolved.confirmed.is_renderable() {
            self.adjacency.update(echo_id, &resolved.confirmed);
        } else {
            // The server changed the event's shape; the echo's slot is no
            // longer meaningful.
            self.adjacency.rebuild(self.store.snapshot().iter());
        }

        tracing::debug!(%echo_id, id = %resolved.confirmed.id, "local echo confirmed");
        self.changed();
        Ok(())
    }

    /// Mark a pending echo as failed.
    pub fn fail_echo(&mut self, echo_id: &str) -> Result<(), TimelineError> {
        self.echoes.expect_state(echo_id, SendState::Pending)?;
        let failed = self.store.fail_echo(echo_id)?;
        self.echoes.fail(echo_id)?;
        self.adjacency.update(echo_id, &failed);

        tracing::debug!(%echo_id, "local echo failed");
        self.updates.push(TimelineUpdate::SendFailed { echo_id: failed.id.clone() });
        self.changed();
        Ok(())
    }

    /// Resubmit a failed send as a new echo at the tail.
    pub fn retry_send(&mut self, echo_id: &str) -> Result<EventId, TimelineError> {
        self.echoes.expect_state(echo_id, SendState::Failed)?;
        let entry = self.echoes.take_failed(echo_id)?;
        self.detach(echo_id)?;

        let retried = self.submit_send(entry.payload)?;
        tracing::debug!(%echo_id, %retried, "retrying failed send");
        Ok(retried)
    }

    /// Discard a pending or failed send.
    pub fn retract_send(&mut self, echo_id: &str) -> Result<(), TimelineError> {
        self.echoes.retract(echo_id)?;
        self.detach(echo_id)?;
        self.changed();
        Ok(())
    }

    /// Delete any record. Removing a local echo also stops tracking it.
    pub fn remove(&mut self, id: &str) -> Result<Arc<EventRecord>, TimelineError> {
        let removed = self.detach(id)?;
        if self.echoes.retract(id).is_ok() {
            tracing::debug!(%id, "removed record was a tracked send");
        }
        self.changed();
        Ok(removed)
    }

    /// Issue a token for a new backfill request.
    pub fn begin_backfill(&mut self) -> PaginationToken {
        self.pagination.begin()
    }

    /// Abandon a backfill request; its batch will be discarded on arrival.
    pub fn cancel_backfill(&mut self, token: PaginationToken) -> bool {
        let cancelled = self.pagination.cancel(token);
        if cancelled {
            tracing::debug!(%token, "cancelled backfill request");
        }
        cancelled
    }

    fn detach(&mut self, id: &str) -> Result<Arc<EventRecord>, TimelineError> {
        let removed = self.store.remove(id)?;
        self.adjacency.remove(id);
        Ok(removed)
    }

    fn changed(&mut self) {
        self.updates.push(TimelineUpdate::Changed { version: self.store.version() });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{env::SystemEnv, event::Timestamp};

    fn timeline() -> Timeline<SystemEnv> {
        Timeline::new(SystemEnv::new(), "@me", TimelineConfig::default()).unwrap()
    }

    fn msg(id: &str, secs: u64) -> EventRecord {
        EventRecord::message(id, "@a", Timestamp::from_secs(secs), id)
    }

    #[test]
    fn rejects_invalid_config() {
        let config =
            TimelineConfig { adjacency_window: std::time::Duration::ZERO, ..Default::default() };
        assert!(matches!(
            Timeline::new(SystemEnv::new(), "@me", config),
            Err(ConfigError::ZeroAdjacencyWindow)
        ));
    }

    #[test]
    fn backward_live_event_prepends() {
        let mut tl = timeline();
        tl.handle(SessionEvent::LiveEvent { record: msg("b", 2), direction: Direction::Forward })
            .unwrap();
        tl.handle(SessionEvent::LiveEvent { record: msg("a", 1), direction: Direction::Backward })
            .unwrap();

        let ids: Vec<_> = tl.snapshot().iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn cancelled_backfill_is_discarded() {
        let mut tl = timeline();
        let token = tl.begin_backfill();
        assert!(tl.cancel_backfill(token));

        tl.handle(SessionEvent::BackfillBatch { token: Some(token), records: vec![msg("a", 1)] })
            .unwrap();

        assert!(tl.snapshot().is_empty());
        assert_eq!(tl.take_updates(), [TimelineUpdate::BatchDiscarded { token }]);
    }

    #[test]
    fn submit_emits_dispatch() {
        let mut tl = timeline();
        let payload = OutgoingPayload::Text { body: "x".into() };
        let echo_id = tl.submit_send(payload.clone()).unwrap();

        let updates = tl.take_updates();
        assert_eq!(updates[0], TimelineUpdate::DispatchSend { echo_id: echo_id.clone(), payload });
        assert!(matches!(updates[1], TimelineUpdate::Changed { .. }));
        assert_eq!(tl.echo_state(echo_id.as_str()), Some(SendState::Pending));
    }

    #[test]
    fn duplicate_send_result_is_ordering_fault() {
        let mut tl = timeline();
        let echo_id = tl.submit_send(OutgoingPayload::Text { body: "x".into() }).unwrap();
        let result = SendOutcome::Confirmed(msg("srv1", 5));

        tl.handle(SessionEvent::SendResult { echo_id: echo_id.clone(), outcome: result.clone() })
            .unwrap();
        let version = tl.version();
        let err = tl.handle(SessionEvent::SendResult { echo_id, outcome: result }).unwrap_err();

        assert!(err.is_ordering_fault());
        assert_eq!(tl.version(), version);
    }

    #[test]
    fn retry_moves_failed_send_to_tail() {
        let mut tl = timeline();
        let echo_id = tl.submit_send(OutgoingPayload::Text { body: "x".into() }).unwrap();
        tl.insert_forward(msg("b", 1));
        tl.fail_echo(echo_id.as_str()).unwrap();

        let retried = tl.retry_send(echo_id.as_str()).unwrap();

        let ids: Vec<_> = tl.snapshot().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, [EventId::new("b"), retried.clone()]);
        assert_eq!(tl.echo_state(retried.as_str()), Some(SendState::Pending));
        assert_eq!(tl.echo_state(echo_id.as_str()), None);
    }

    #[test]
    fn confirmed_record_of_another_shape_is_tracked() {
        let mut tl = timeline();
        tl.insert_forward(msg("a", 1));
        let payload = OutgoingPayload::Reaction { target: EventId::new("a"), key: "+".into() };
        let echo_id = tl.submit_send(payload).unwrap();
        assert_eq!(tl.view().adjacency().len(), 1);

        tl.resolve_echo(echo_id.as_str(), msg("srv1", 2)).unwrap();

        let view = tl.view();
        let window = tl.config().adjacency_window;
        let rescan =
            crate::adjacency::compute_adjacency(view.snapshot().iter().map(AsRef::as_ref), window);
        assert_eq!(view.adjacency().entries(), rescan);
        assert_eq!(view.adjacency().len(), 2);
    }

    #[test]
    fn held_views_do_not_see_later_inserts() {
        let mut tl = timeline();
        let mut views = Vec::new();
        for n in 0..512 {
            tl.insert_forward(msg(&format!("m{n}"), n));
            views.push(tl.view());
        }

        for (n, view) in views.iter().enumerate() {
            assert_eq!(view.snapshot().len(), n + 1);
            assert_eq!(view.adjacency().len(), n + 1);
            assert!(view.adjacency_flags(&format!("m{n}")).is_some_and(|f| !f.bottom));
        }
        let window = tl.config().adjacency_window;
        let view = tl.view();
        let rescan =
            crate::adjacency::compute_adjacency(view.snapshot().iter().map(AsRef::as_ref), window);
        assert_eq!(view.adjacency().entries(), rescan);
    }

    #[test]
    fn remove_stops_tracking_echo() {
        let mut tl = timeline();
        tl.insert_forward(msg("a", 1));
        let echo_id = tl.submit_send(OutgoingPayload::Text { body: "x".into() }).unwrap();

        // Removing an unrelated record leaves the send tracked.
        tl.remove("a").unwrap();
        assert_eq!(tl.echo_state(echo_id.as_str()), Some(SendState::Pending));

        tl.remove(echo_id.as_str()).unwrap();

        assert!(tl.echoes().is_empty());
        assert!(tl.snapshot().is_empty());
        assert!(matches!(tl.remove(echo_id.as_str()), Err(TimelineError::NotFound(_))));
    }
}
