//! Actor task that owns the timeline.
//!
//! Commands from every producer arrive on one channel and are applied in
//! arrival order, so the timeline sees a single writer. After each command
//! the actor drains the timeline's updates: `Changed` republishes the view,
//! everything else goes to the outbox for the session to act on. The reply
//! is sent only after publishing, so a caller that reads the view after its
//! command returns sees its own write.
//!
//! The outbox is unbounded and the actor never waits on it. A session that
//! stops draining it only grows the queue; producers keep making progress.

use strand_timeline::{
    Environment, EventId, OutgoingPayload, PaginationToken, SessionEvent, Timeline, TimelineError,
    TimelineUpdate, TimelineView,
};
use tokio::sync::{mpsc, oneshot, watch};

type Reply<T> = oneshot::Sender<T>;
type Completion = Box<dyn FnOnce() + Send>;

pub(crate) enum Command {
    Deliver { event: SessionEvent, reply: Reply<Result<(), TimelineError>> },
    Submit { payload: OutgoingPayload, reply: Reply<Result<EventId, TimelineError>> },
    Retry { echo_id: EventId, reply: Reply<Result<EventId, TimelineError>> },
    Retract { echo_id: EventId, reply: Reply<Result<(), TimelineError>> },
    Remove { id: EventId, reply: Reply<Result<(), TimelineError>> },
    BeginBackfill { reply: Reply<PaginationToken> },
    CancelBackfill { token: PaginationToken, reply: Reply<bool> },
    Shutdown,
}

pub(crate) async fn run<E: Environment>(
    mut timeline: Timeline<E>,
    mut commands: mpsc::Receiver<Command>,
    views: watch::Sender<TimelineView>,
    outbox: mpsc::UnboundedSender<TimelineUpdate>,
) {
    tracing::info!(user = %timeline.own_user(), "timeline actor started");

    while let Some(command) = commands.recv().await {
        if matches!(command, Command::Shutdown) {
            break;
        }
        let complete = apply(&mut timeline, command);
        publish(&mut timeline, &views, &outbox);
        complete();
    }

    tracing::info!("timeline actor stopped");
}

fn apply<E: Environment>(timeline: &mut Timeline<E>, command: Command) -> Completion {
    match command {
        Command::Deliver { event, reply } => respond(reply, timeline.handle(event)),
        Command::Submit { payload, reply } => respond(reply, timeline.submit_send(payload)),
        Command::Retry { echo_id, reply } => {
            respond(reply, timeline.retry_send(echo_id.as_str()))
        },
        Command::Retract { echo_id, reply } => {
            respond(reply, timeline.retract_send(echo_id.as_str()))
        },
        Command::Remove { id, reply } => {
            respond(reply, timeline.remove(id.as_str()).map(|_| ()))
        },
        Command::BeginBackfill { reply } => respond(reply, timeline.begin_backfill()),
        Command::CancelBackfill { token, reply } => {
            respond(reply, timeline.cancel_backfill(token))
        },
        Command::Shutdown => Box::new(|| {}),
    }
}

fn respond<T: Send + 'static>(reply: Reply<T>, value: T) -> Completion {
    // A dropped receiver means the caller stopped waiting; the mutation
    // still stands.
    Box::new(move || {
        let _ = reply.send(value);
    })
}

fn publish<E: Environment>(
    timeline: &mut Timeline<E>,
    views: &watch::Sender<TimelineView>,
    outbox: &mpsc::UnboundedSender<TimelineUpdate>,
) {
    let (changed, outbound): (Vec<_>, Vec<_>) = timeline
        .take_updates()
        .into_iter()
        .partition(|update| matches!(update, TimelineUpdate::Changed { .. }));

    if !changed.is_empty() {
        let view = timeline.view();
        tracing::trace!(version = view.version(), "publishing timeline view");
        views.send_replace(view);
    }

    for update in outbound {
        if outbox.send(update).is_err() {
            tracing::debug!("outbox receiver dropped, update discarded");
        }
    }
}
