//! Drives a timeline actor through a script.

use strand_runtime::{RuntimeConfig, RuntimeError, TimelineHandle, TimelineRuntime};
use strand_timeline::{
    Environment, EventId, PaginationToken, SendOutcome, SessionEvent, Timeline, TimelineUpdate,
    TimelineView,
};

use tokio::sync::mpsc::error::TryRecvError;

use crate::{
    ReplayError,
    script::{ScriptLine, Step},
};

/// Replay `script` against `timeline` and return the final view.
///
/// Outbound updates are drained and logged. Dispatched sends are only
/// confirmed or failed when the script says so.
pub async fn replay<E: Environment>(
    timeline: Timeline<E>,
    script: Vec<ScriptLine>,
) -> Result<TimelineView, ReplayError> {
    let mut runtime = TimelineRuntime::spawn(timeline, RuntimeConfig::default());
    let handle = runtime.handle();
    let mut driver = Driver { handle: handle.clone(), echoes: Vec::new(), pages: Vec::new() };

    let mut outbox_open = true;
    for ScriptLine { line, step } in script {
        // Log what the session would act on, step by step.
        while outbox_open {
            match runtime.outbox().try_recv() {
                Ok(update) => log_update(&update),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => outbox_open = false,
            }
        }
        driver.run(line, step).await?;
    }
    while let Ok(update) = runtime.outbox().try_recv() {
        log_update(&update);
    }

    let view = handle.view();
    runtime.shutdown().await?;
    Ok(view)
}

struct Driver {
    handle: TimelineHandle,
    echoes: Vec<EventId>,
    pages: Vec<PaginationToken>,
}

impl Driver {
    async fn run(&mut self, line: usize, step: Step) -> Result<(), ReplayError> {
        let result = match step {
            Step::Backfill { records, page } => {
                let token = page.map(|index| self.page(line, index)).transpose()?;
                self.handle.deliver(SessionEvent::BackfillBatch { token, records }).await
            },
            Step::Live { record, direction } => {
                self.handle.deliver(SessionEvent::LiveEvent { record, direction }).await
            },
            Step::Send { payload } => {
                self.handle.submit_send(payload).await.map(|echo_id| self.echoes.push(echo_id))
            },
            Step::Confirm { echo, record } => {
                let echo_id = self.echo(line, echo)?;
                let outcome = SendOutcome::Confirmed(record);
                self.handle.deliver(SessionEvent::SendResult { echo_id, outcome }).await
            },
            Step::Fail { echo } => {
                let echo_id = self.echo(line, echo)?;
                let outcome = SendOutcome::Failed;
                self.handle.deliver(SessionEvent::SendResult { echo_id, outcome }).await
            },
            Step::Retry { echo } => {
                let echo_id = self.echo(line, echo)?;
                self.handle.retry_send(echo_id).await.map(|retried| self.echoes.push(retried))
            },
            Step::Retract { echo } => {
                let echo_id = self.echo(line, echo)?;
                self.handle.retract_send(echo_id).await
            },
            Step::BeginBackfill => {
                let token = self.handle.begin_backfill().await?;
                self.pages.push(token);
                Ok(())
            },
            Step::CancelBackfill { page } => {
                let token = self.page(line, page)?;
                self.handle.cancel_backfill(token).await.map(|_| ())
            },
        };

        match result {
            Err(RuntimeError::Timeline(e)) => {
                tracing::warn!(line, error = %e, "step rejected");
                Ok(())
            },
            other => other.map_err(ReplayError::from),
        }
    }

    fn echo(&self, line: usize, index: usize) -> Result<EventId, ReplayError> {
        self.echoes
            .get(index)
            .cloned()
            .ok_or(ReplayError::UnknownReference { line, what: "send", index })
    }

    fn page(&self, line: usize, index: usize) -> Result<PaginationToken, ReplayError> {
        self.pages
            .get(index)
            .copied()
            .ok_or(ReplayError::UnknownReference { line, what: "page", index })
    }
}

fn log_update(update: &TimelineUpdate) {
    match update {
        TimelineUpdate::DispatchSend { echo_id, .. } => {
            tracing::debug!(%echo_id, "send dispatched");
        },
        TimelineUpdate::SendFailed { echo_id } => tracing::info!(%echo_id, "send failed"),
        TimelineUpdate::BatchDiscarded { token } => {
            tracing::info!(%token, "backfill batch discarded");
        },
        TimelineUpdate::Changed { .. } => {},
    }
}
