//! Observable timeline state for invariant checking.

use std::time::Duration;

use strand_timeline::{EventId, Environment, SendState, Timeline, TimelineSnapshot, TimelineView};

/// Everything the invariants look at, captured at one point in time.
#[derive(Debug, Clone)]
pub struct TimelineState {
    /// View published to readers.
    pub view: TimelineView,
    /// Sends tracked by the echo manager, in submission order.
    pub echoes: Vec<(EventId, SendState)>,
    /// Adjacency window the timeline runs with.
    pub adjacency_window: Duration,
}

impl TimelineState {
    /// Capture the state of a live timeline.
    pub fn capture<E: Environment>(timeline: &Timeline<E>) -> Self {
        let echoes = timeline
            .echoes()
            .entries()
            .into_iter()
            .map(|(id, entry)| (id.clone(), entry.state))
            .collect();

        Self {
            view: timeline.view(),
            echoes,
            adjacency_window: timeline.config().adjacency_window,
        }
    }

    /// Store snapshot of the captured view.
    pub fn snapshot(&self) -> &TimelineSnapshot {
        self.view.snapshot()
    }
}
