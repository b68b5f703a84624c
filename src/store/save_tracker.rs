use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::model::LineNo;

/// Save state of a single line
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    /// Sent to the backend, not yet acknowledged
    Pending,
    Saved { at: DateTime<Local> },
    /// The last save failed; the local text is kept until the user retries
    Failed { message: String },
}

#[derive(Debug, Clone)]
struct LineSave {
    /// Text currently displayed for the line
    displayed: String,
    status: SaveStatus,
}

/// Tracks line saves sent on blur. Acknowledgements may arrive out of order;
/// only one matching the currently displayed text changes the line's state.
#[derive(Debug, Default)]
pub struct SaveTracker {
    lines: HashMap<LineNo, LineSave>,
}

impl SaveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `text` was sent as the new content of a line
    pub fn record_edit(&mut self, line_no: LineNo, text: &str) {
        self.lines.insert(
            line_no,
            LineSave {
                displayed: text.to_string(),
                status: SaveStatus::Pending,
            },
        );
    }

    /// Apply a save acknowledgement. Returns false when it was stale (its text is no
    /// longer what the line displays) and therefore ignored.
    pub fn acknowledge(
        &mut self,
        line_no: LineNo,
        saved_text: &str,
        result: Result<(), String>,
    ) -> bool {
        let Some(entry) = self.lines.get_mut(&line_no) else {
            return false;
        };
        if entry.displayed != saved_text {
            tracing::debug!(line_no, "ignoring stale save acknowledgement");
            return false;
        }

        entry.status = match result {
            Ok(()) => SaveStatus::Saved { at: Local::now() },
            Err(message) => {
                tracing::warn!(line_no, %message, "line save failed");
                SaveStatus::Failed { message }
            }
        };
        true
    }

    pub fn forget(&mut self, line_no: LineNo) {
        self.lines.remove(&line_no);
    }

    pub fn status(&self, line_no: LineNo) -> Option<&SaveStatus> {
        self.lines.get(&line_no).map(|e| &e.status)
    }

    pub fn failed_lines(&self) -> Vec<LineNo> {
        let mut failed: Vec<LineNo> = self
            .lines
            .iter()
            .filter(|(_, e)| matches!(e.status, SaveStatus::Failed { .. }))
            .map(|(&n, _)| n)
            .collect();
        failed.sort_unstable();
        failed
    }

    /// Get the status text for display
    pub fn status_text(&self, line_no: LineNo) -> String {
        match self.status(line_no) {
            None => String::new(),
            Some(SaveStatus::Pending) => "Saving...".to_string(),
            Some(SaveStatus::Failed { message }) => format!("not saved: {message}"),
            Some(SaveStatus::Saved { at }) => format_time_since(*at, Local::now()),
        }
    }
}

/// Format a save time relative to `now` as a human-readable string
pub fn format_time_since(time: DateTime<Local>, now: DateTime<Local>) -> String {
    let secs = (now - time).num_seconds();
    if secs < 0 {
        return "saved (time error)".to_string();
    }

    if secs < 60 {
        "saved just now".to_string()
    } else if secs < 3600 {
        let mins = secs / 60;
        if mins == 1 {
            "saved 1 min ago".to_string()
        } else {
            format!("saved {} min ago", mins)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        if hours == 1 {
            "saved 1 hour ago".to_string()
        } else {
            format!("saved {} hours ago", hours)
        }
    } else if secs < 604800 {
        let days = secs / 86400;
        if days == 1 {
            "saved 1 day ago".to_string()
        } else {
            format!("saved {} days ago", days)
        }
    } else {
        format!("saved {}", time.format("%Y-%m-%d"))
    }
}
