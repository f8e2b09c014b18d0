//! Producer-side handle and runtime lifecycle.

use strand_timeline::{
    Environment, EventId, OutgoingPayload, PaginationToken, SessionEvent, Timeline,
    TimelineUpdate, TimelineView,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    RuntimeError,
    actor::{self, Command},
};

/// Channel sizing for a [`TimelineRuntime`].
///
/// Only the command channel is bounded. The outbox is unbounded so the actor
/// never waits on the session.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Commands buffered before producers wait.
    pub command_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { command_capacity: 64 }
    }
}

/// Cloneable handle for producers and readers.
///
/// Every method funnels through the actor; reads come from the last
/// published view and never block on the actor.
#[derive(Clone)]
pub struct TimelineHandle {
    commands: mpsc::Sender<Command>,
    views: watch::Receiver<TimelineView>,
}

impl TimelineHandle {
    /// Latest published view.
    pub fn view(&self) -> TimelineView {
        self.views.borrow().clone()
    }

    /// Receiver notified whenever a new view is published.
    pub fn subscribe(&self) -> watch::Receiver<TimelineView> {
        self.views.clone()
    }

    /// Apply a session event.
    pub async fn deliver(&self, event: SessionEvent) -> Result<(), RuntimeError> {
        Ok(self.request(|reply| Command::Deliver { event, reply }).await??)
    }

    /// Submit a local send. Returns the echo's placeholder id.
    pub async fn submit_send(&self, payload: OutgoingPayload) -> Result<EventId, RuntimeError> {
        Ok(self.request(|reply| Command::Submit { payload, reply }).await??)
    }

    /// Resubmit a failed send as a new echo.
    pub async fn retry_send(&self, echo_id: EventId) -> Result<EventId, RuntimeError> {
        Ok(self.request(|reply| Command::Retry { echo_id, reply }).await??)
    }

    /// Discard a pending or failed send.
    pub async fn retract_send(&self, echo_id: EventId) -> Result<(), RuntimeError> {
        Ok(self.request(|reply| Command::Retract { echo_id, reply }).await??)
    }

    /// Delete a record.
    pub async fn remove(&self, id: EventId) -> Result<(), RuntimeError> {
        Ok(self.request(|reply| Command::Remove { id, reply }).await??)
    }

    /// Issue a token for a new backfill request.
    pub async fn begin_backfill(&self) -> Result<PaginationToken, RuntimeError> {
        self.request(|reply| Command::BeginBackfill { reply }).await
    }

    /// Abandon a backfill request.
    pub async fn cancel_backfill(&self, token: PaginationToken) -> Result<bool, RuntimeError> {
        self.request(|reply| Command::CancelBackfill { token, reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await.map_err(|_| RuntimeError::ActorClosed)?;
        response.await.map_err(|_| RuntimeError::ActorClosed)
    }
}

/// A running timeline actor.
pub struct TimelineRuntime {
    handle: TimelineHandle,
    outbox: mpsc::UnboundedReceiver<TimelineUpdate>,
    task: JoinHandle<()>,
}

impl TimelineRuntime {
    /// Move `timeline` into a new actor task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<E: Environment>(timeline: Timeline<E>, config: RuntimeConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity.max(1));
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (views_tx, views_rx) = watch::channel(timeline.view());

        let task = tokio::spawn(actor::run(timeline, commands_rx, views_tx, outbox_tx));

        Self {
            handle: TimelineHandle { commands: commands_tx, views: views_rx },
            outbox: outbox_rx,
            task,
        }
    }

    /// New handle to the actor.
    pub fn handle(&self) -> TimelineHandle {
        self.handle.clone()
    }

    /// Updates the session must act on: sends to dispatch, failures to
    /// surface, discarded batches.
    ///
    /// Nothing waits for this queue to be read; updates accumulate until
    /// drained.
    pub fn outbox(&mut self) -> &mut mpsc::UnboundedReceiver<TimelineUpdate> {
        &mut self.outbox
    }

    /// Stop the actor after it finishes the commands already queued.
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        let Self { handle, outbox, task } = self;
        // Updates for the commands still queued have no reader.
        drop(outbox);
        if handle.commands.send(Command::Shutdown).await.is_err() {
            tracing::debug!("timeline actor already stopped");
        }
        task.await?;
        Ok(())
    }
}
