//! Plain-text rendering of a timeline view.

use std::fmt;

use strand_timeline::{ContentStatus, EventKind, SendState, Timestamp, TimelineView};

/// Display adapter printing one line per renderable event.
///
/// The leading glyph shows adjacency: `-` stands alone, `┌` opens a group,
/// `│` continues it and `└` closes it. Reactions follow on an indented line
/// and the room-list preview closes the output.
pub struct Rendered<'a>(pub &'a TimelineView);

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.0;

        for entry in view.renderable_sequence() {
            let record = &entry.record;
            let flags = view.adjacency_flags(record.id.as_str()).unwrap_or_default();
            let glyph = match (flags.top, flags.bottom) {
                (false, false) => '-',
                (false, true) => '┌',
                (true, true) => '│',
                (true, false) => '└',
            };
            write!(f, "{glyph} {} ", clock(record.timestamp()))?;

            if record.kind == EventKind::MembershipChange {
                write!(f, "* {}", entry.content.body)?;
            } else {
                write!(f, "{}:", record.sender)?;
                if !entry.content.body.is_empty() {
                    write!(f, " {}", entry.content.body)?;
                }
            }

            match &entry.content.status {
                ContentStatus::Original => {},
                ContentStatus::Edited => write!(f, " (edited)")?,
                ContentStatus::Redacted { reason: Some(reason) } => {
                    write!(f, " [redacted: {reason}]")?;
                },
                ContentStatus::Redacted { reason: None } => write!(f, " [redacted]")?,
                ContentStatus::Malformed => write!(f, " [unsupported]")?,
            }
            match record.send_state {
                SendState::Sent => {},
                SendState::Pending => write!(f, " (sending)")?,
                SendState::Failed => write!(f, " (failed)")?,
            }
            writeln!(f)?;

            let reactions = view.reaction_groups(record.id.as_str());
            if !reactions.is_empty() {
                let groups: Vec<String> =
                    reactions.iter().map(|(key, n)| format!("{key} {}", n.len())).collect();
                writeln!(f, "    {}", groups.join("  "))?;
            }
        }

        writeln!(f, "preview: {}", view.last_message_preview())
    }
}

/// `HH:MM` in UTC.
fn clock(ts: Timestamp) -> String {
    let secs = ts.as_millis() / 1000 % 86_400;
    format!("{:02}:{:02}", secs / 3600, secs / 60 % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_utc_time_of_day() {
        assert_eq!(clock(Timestamp::from_secs(0)), "00:00");
        // 2023-11-14T22:13:20Z
        assert_eq!(clock(Timestamp::from_millis(1_700_000_000_000)), "22:13");
    }
}
