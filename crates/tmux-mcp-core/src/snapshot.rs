//! Point-in-time observations of a tmux pane.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// A single capture of a session.
///
/// Produced once and never mutated. `fingerprint` is always derived from
/// `raw_text`; `formatted_text` is the numbered rendering handed to agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CaptureSnapshot {
    /// Session the capture was taken from
    pub session_name: String,
    /// Exact pane text as returned by the backend
    pub raw_text: String,
    /// Line-numbered rendering of `raw_text`
    pub formatted_text: String,
    /// Fingerprint of `raw_text`
    pub fingerprint: Fingerprint,
    /// Text of the line under the cursor (empty without cursor information)
    pub cursor_line: String,
    /// Cursor row, 0-based from the top of the visible pane
    pub cursor_row: usize,
    /// Cursor column, 0-based
    pub cursor_col: usize,
    /// Whether the cursor fields were actually observed
    pub has_cursor: bool,
    /// RFC 3339 capture time
    pub captured_at: String,
}

impl CaptureSnapshot {
    /// Build a snapshot from plain pane text.
    pub fn new(session_name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        Self {
            session_name: session_name.into(),
            formatted_text: format_output(&raw_text),
            fingerprint: Fingerprint::of(raw_text.as_bytes()),
            raw_text,
            cursor_line: String::new(),
            cursor_row: 0,
            cursor_col: 0,
            has_cursor: false,
            captured_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Build a snapshot from pane text plus the cursor position.
    ///
    /// A row outside the captured lines yields an empty cursor line.
    pub fn with_cursor(
        session_name: impl Into<String>,
        raw_text: impl Into<String>,
        cursor_row: usize,
        cursor_col: usize,
    ) -> Self {
        let mut snapshot = Self::new(session_name, raw_text);
        snapshot.cursor_line = line_at(&snapshot.raw_text, cursor_row)
            .unwrap_or_default()
            .to_string();
        snapshot.cursor_row = cursor_row;
        snapshot.cursor_col = cursor_col;
        snapshot.has_cursor = true;
        snapshot
    }
}

/// Line `row` of `text`, splitting on `\n` only.
pub fn line_at(text: &str, row: usize) -> Option<&str> {
    text.split('\n').nth(row)
}

/// Render pane text as numbered lines.
///
/// Every non-blank line becomes `[n]: text`. A run of blank lines keeps its
/// first line as `[n]: ` and, if the run is longer than one line, is followed
/// by a `... N empty lines ...` marker.
pub fn format_output(text: &str) -> String {
    let mut formatted: Vec<String> = Vec::new();
    let mut empty_run = 0usize;

    for (index, line) in text.split('\n').enumerate() {
        let number = index + 1;
        if line.trim().is_empty() {
            empty_run += 1;
            if empty_run == 1 {
                formatted.push(format!("[{number}]: "));
            }
        } else {
            if empty_run > 1 {
                formatted.push(format!("... {empty_run} empty lines ..."));
            }
            empty_run = 0;
            formatted.push(format!("[{number}]: {line}"));
        }
    }

    if empty_run > 1 {
        formatted.push(format!("... {empty_run} empty lines ..."));
    }

    formatted.join("\n")
}
