//! Adapter driving a real [`Timeline`] with model operations.

use std::time::Duration;

use strand_timeline::{
    ConfigError, Environment, EventId, OutgoingPayload, SendState, Timeline, TimelineConfig,
    TimelineError, UserId,
};

use super::{
    operation::{
        OWN_USER, Operation, OperationError, OperationResult, confirmed_record, normalize_id,
    },
    world::{ObservableState, RenderedEntry},
};
use crate::{invariants::TimelineState, sim_env::SimEnv};

/// Real timeline under a simulated environment.
pub struct RealTimeline {
    timeline: Timeline<SimEnv>,
    env: SimEnv,
}

impl RealTimeline {
    /// Timeline for [`OWN_USER`] with the default configuration.
    pub fn new(seed: u64) -> Result<Self, ConfigError> {
        let env = SimEnv::with_seed(seed);
        let timeline = Timeline::new(env.clone(), OWN_USER, TimelineConfig::default())?;
        Ok(Self { timeline, env })
    }

    /// Underlying timeline.
    pub fn timeline(&self) -> &Timeline<SimEnv> {
        &self.timeline
    }

    /// State for invariant checking.
    pub fn state(&self) -> TimelineState {
        TimelineState::capture(&self.timeline)
    }

    /// Apply an operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let result = match op {
            Operation::Backfill { events } => {
                self.timeline.insert_backward(events.iter().map(|e| e.to_record()).collect());
                Ok(())
            },
            Operation::LiveBackward { event } => {
                self.timeline.insert_backward(vec![event.to_record()]);
                Ok(())
            },
            Operation::Live { event } => {
                self.timeline.insert_forward(event.to_record());
                Ok(())
            },
            Operation::SendText { .. }
            | Operation::SendReaction { .. }
            | Operation::SendEdit { .. }
            | Operation::SendRedaction { .. } => {
                match op.payload() {
                    Some(payload) => {
                        self.timeline.submit_send(payload).map(drop).map_err(map_error)
                    },
                    None => Err(OperationError::Rejected),
                }
            },
            Operation::Remove { target } => {
                let id = Operation::confirmed_id(*target);
                self.timeline.remove(id.as_str()).map(drop).map_err(map_error)
            },
            Operation::Confirm { echo, server_id } => {
                let (echo_id, payload) = self.pick(*echo)?;
                let confirmed =
                    confirmed_record(&payload, Operation::confirmed_id(*server_id), self.env.now());
                self.timeline.resolve_echo(echo_id.as_str(), confirmed).map_err(map_error)
            },
            Operation::Fail { echo } => {
                let (echo_id, _) = self.pick(*echo)?;
                self.timeline.fail_echo(echo_id.as_str()).map_err(map_error)
            },
            Operation::Retry { echo } => {
                let (echo_id, _) = self.pick(*echo)?;
                self.timeline.retry_send(echo_id.as_str()).map(drop).map_err(map_error)
            },
            Operation::Retract { echo } => {
                let (echo_id, _) = self.pick(*echo)?;
                self.timeline.retract_send(echo_id.as_str()).map_err(map_error)
            },
            Operation::AdvanceTime { secs } => {
                self.env.advance(Duration::from_secs(Operation::advance_secs(*secs)));
                Ok(())
            },
        };

        if let Err(e) = &result {
            tracing::trace!(?op, error = ?e, "operation refused");
        }
        // Outbound dispatch is not modelled.
        self.timeline.take_updates();
        result
    }

    /// Observable state of the real timeline.
    pub fn observable_state(&self) -> ObservableState {
        let view = self.timeline.view();
        let snapshot = view.snapshot();

        let rendered = view
            .renderable_sequence()
            .into_iter()
            .map(|entry| {
                let id = entry.record.id.as_str();
                let flags = view.adjacency_flags(id).unwrap_or_default();
                RenderedEntry {
                    id: normalize_id(&entry.record.id),
                    body: entry.content.body.clone(),
                    redacted: entry.content.is_redacted(),
                    edits: entry.edits.len(),
                    reactions: view
                        .reaction_groups(id)
                        .iter()
                        .map(|(key, senders)| {
                            (key.to_string(), senders.iter().map(UserId::to_string).collect())
                        })
                        .collect(),
                    top: flags.top,
                    bottom: flags.bottom,
                }
            })
            .collect();

        ObservableState {
            records: snapshot.iter().map(|r| (normalize_id(&r.id), r.send_state)).collect(),
            echoes: self
                .timeline
                .echoes()
                .entries()
                .into_iter()
                .map(|(id, entry)| (normalize_id(id), entry.state))
                .collect(),
            rendered,
            preview: view.last_message_preview(),
        }
    }

    /// Tracked send selected by `seed`, in submission order.
    fn pick(&self, seed: u8) -> Result<(EventId, OutgoingPayload), OperationError> {
        let entries = self.timeline.echoes().entries();
        if entries.is_empty() {
            return Err(OperationError::NoSuchEcho);
        }
        let (id, entry) = entries[usize::from(seed) % entries.len()];
        Ok((id.clone(), entry.payload.clone()))
    }

    /// Current state of a tracked send.
    pub fn echo_state(&self, id: &str) -> Option<SendState> {
        self.timeline.echo_state(id)
    }
}

fn map_error(e: TimelineError) -> OperationError {
    match e {
        TimelineError::UnknownEcho(_) => OperationError::NoSuchEcho,
        TimelineError::NotFound(_) => OperationError::NoSuchRecord,
        TimelineError::InvalidEchoState { .. } => OperationError::InvalidState,
        TimelineError::EmptyBody | TimelineError::TargetNotConfirmed(_) => OperationError::Rejected,
    }
}
