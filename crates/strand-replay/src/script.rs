//! JSON-lines replay scripts.
//!
//! One step per line. Blank lines and lines starting with `#` are skipped.
//! Sends are referred to by the order they were created in (`"echo": 0` is
//! the first `send`, a `retry` creates a new one), backfill requests by the
//! order of their `begin_backfill` steps.
//!
//! ```text
//! {"step":"backfill","records":[...]}
//! {"step":"send","payload":{"type":"text","body":"hi"}}
//! {"step":"confirm","echo":0,"record":{...}}
//! ```

use std::io::BufRead;

use serde::Deserialize;
use strand_timeline::{Direction, EventRecord, OutgoingPayload};

use crate::ReplayError;

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Deliver a page of history.
    Backfill {
        /// Records, oldest first.
        records: Vec<EventRecord>,
        /// Request this page answers, by `begin_backfill` index.
        #[serde(default)]
        page: Option<usize>,
    },
    /// Deliver one live event.
    Live {
        /// The event.
        record: EventRecord,
        /// Transport direction.
        #[serde(default)]
        direction: Direction,
    },
    /// Submit a local send.
    Send {
        /// What to send.
        payload: OutgoingPayload,
    },
    /// Report a send as confirmed.
    Confirm {
        /// Send index.
        echo: usize,
        /// Record the server assigned.
        record: EventRecord,
    },
    /// Report a send as failed.
    Fail {
        /// Send index.
        echo: usize,
    },
    /// Retry a failed send.
    Retry {
        /// Send index.
        echo: usize,
    },
    /// Discard a send.
    Retract {
        /// Send index.
        echo: usize,
    },
    /// Open a backfill request.
    BeginBackfill,
    /// Abandon a backfill request.
    CancelBackfill {
        /// Request index.
        page: usize,
    },
}

/// A step with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 1-based line number.
    pub line: usize,
    /// Parsed step.
    pub step: Step,
}

/// Parse a whole script.
pub fn parse_script(reader: impl BufRead) -> Result<Vec<ScriptLine>, ReplayError> {
    let mut steps = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step = serde_json::from_str(trimmed)
            .map_err(|source| ReplayError::Parse { line: line_no, source })?;
        steps.push(ScriptLine { line: line_no, step });
    }

    Ok(steps)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use strand_timeline::{Content, EventKind};

    use super::*;

    #[test]
    fn parses_steps_and_skips_comments() {
        let script = r#"
# history
{"step":"backfill","records":[{"id":"$1","kind":"message","sender":"@a","origin_timestamp":1000,"content":{"type":"message","body":"hi"}}]}

{"step":"send","payload":{"type":"reaction","target":"$1","key":"👍"}}
{"step":"fail","echo":0}
{"step":"begin_backfill"}
"#;
        let steps = parse_script(script.as_bytes()).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].line, 3);

        let Step::Backfill { records, page } = &steps[0].step else {
            panic!("expected backfill, got {:?}", steps[0].step);
        };
        assert_eq!(*page, None);
        assert_eq!(records[0].kind, EventKind::Message);
        assert_eq!(records[0].content, Content::Message { body: "hi".into() });
        assert_eq!(steps[2].step, Step::Fail { echo: 0 });
        assert_eq!(steps[3].step, Step::BeginBackfill);
    }

    #[test]
    fn reports_the_failing_line() {
        let script = "{\"step\":\"begin_backfill\"}\n{\"step\":\"teleport\"}\n";
        let err = parse_script(script.as_bytes()).unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 2, .. }));
    }
}
