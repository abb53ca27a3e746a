//! MCP Tool Types
//!
//! Parameter and response types for every tool the server exposes.
//! Parameters double as JSON schemas for the MCP tool listing.

use std::collections::BTreeMap;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tmux_mcp_core::{CaptureSnapshot, Fingerprint, SessionSelector};
use tmux_mcp_session::{WaitKind, WaitOutcome};

/// Convert a `max_wait` in seconds into a deadline override.
///
/// Absent or zero means the configured default.
pub fn max_wait_duration(max_wait: Option<f64>) -> Result<Option<Duration>, String> {
    match max_wait {
        None => Ok(None),
        Some(secs) if secs == 0.0 => Ok(None),
        Some(secs) if secs.is_finite() && secs > 0.0 => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|e| format!("max_wait of {secs} seconds is out of range: {e}")),
        Some(secs) => Err(format!(
            "max_wait must be a positive number of seconds, got {secs}"
        )),
    }
}

// =============================================================================
// Inspection Tools
// =============================================================================

/// Parameters for tmux_capture
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CaptureParams {
    /// Exact session name (takes precedence over prefix)
    #[serde(default)]
    pub session: Option<String>,

    /// Session name prefix; must match exactly one live session
    #[serde(default)]
    pub prefix: Option<String>,
}

impl CaptureParams {
    /// Which session the caller means.
    pub fn selector(&self) -> SessionSelector {
        SessionSelector {
            session: self.session.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

/// Response for tmux_capture
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResponse {
    /// Session that was captured
    pub session: String,

    /// Fingerprint to pass to the next mutating call
    pub fingerprint: Fingerprint,

    /// Captured output, one `[n]: text` line per row
    pub output: String,
}

impl From<CaptureSnapshot> for CaptureResponse {
    fn from(snapshot: CaptureSnapshot) -> Self {
        Self {
            session: snapshot.session_name,
            fingerprint: snapshot.fingerprint,
            output: snapshot.formatted_text,
        }
    }
}

/// Parameters for tmux_list
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListParams {
    /// Only list sessions whose name starts with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Response for tmux_list
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    /// Live session names
    pub sessions: Vec<String>,

    /// Number of sessions listed
    pub count: usize,
}

// =============================================================================
// Session Lifecycle Tools
// =============================================================================

/// Parameters for tmux_new_session
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NewSessionParams {
    /// Program and arguments to run (the default shell if empty)
    #[serde(default)]
    pub command: Vec<String>,

    /// Session name prefix (defaults to the git repository name)
    #[serde(default)]
    pub prefix: Option<String>,

    /// Extra environment variables for the session
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Wait until this text appears on the cursor line
    #[serde(default)]
    pub expect: Option<String>,

    /// Maximum seconds to wait for output (0 or absent for the default)
    #[serde(default)]
    pub max_wait: Option<f64>,

    /// Kill existing sessions with the same prefix first
    #[serde(default)]
    pub kill_others: bool,

    /// Fingerprint of each session kill_others will destroy, keyed by session name
    #[serde(default)]
    pub kill_fingerprints: BTreeMap<String, String>,

    /// Create even if a session with the same prefix exists
    #[serde(default)]
    pub allow_multiple: bool,
}

/// Response for tools that act and then wait for output
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    /// Session acted on
    pub session: String,

    /// Fingerprint of the output below, for the next mutating call
    pub fingerprint: Fingerprint,

    /// Output after the wait, one `[n]: text` line per row
    pub output: String,

    /// How the wait ended
    pub wait: WaitKind,

    /// Milliseconds spent waiting
    pub waited_ms: u64,

    /// Human-readable summary
    pub message: String,
}

impl ActionResponse {
    /// Response for `outcome`, summarised by `message`.
    pub fn new(outcome: WaitOutcome, message: impl Into<String>) -> Self {
        Self {
            session: outcome.snapshot.session_name,
            fingerprint: outcome.snapshot.fingerprint,
            output: outcome.snapshot.formatted_text,
            wait: outcome.kind,
            waited_ms: outcome.waited.as_millis() as u64,
            message: message.into(),
        }
    }
}

/// Parameters for tmux_kill
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct KillParams {
    /// Exact session name (takes precedence over prefix)
    #[serde(default)]
    pub session: Option<String>,

    /// Session name prefix; must match exactly one live session
    #[serde(default)]
    pub prefix: Option<String>,

    /// Fingerprint from the most recent capture of this session
    pub fingerprint: String,
}

impl KillParams {
    /// Which session the caller means.
    pub fn selector(&self) -> SessionSelector {
        SessionSelector {
            session: self.session.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

/// Response for tmux_kill
#[derive(Debug, Clone, Serialize)]
pub struct KillResponse {
    /// Session that was destroyed
    pub session: String,

    /// Success message
    pub message: String,
}

// =============================================================================
// Input Tools
// =============================================================================

/// Parameters for tmux_send_keys
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SendKeysParams {
    /// Exact session name (takes precedence over prefix)
    #[serde(default)]
    pub session: Option<String>,

    /// Session name prefix; must match exactly one live session
    #[serde(default)]
    pub prefix: Option<String>,

    /// Fingerprint from the most recent capture of this session
    pub fingerprint: String,

    /// Text to type, sent literally
    pub keys: String,

    /// Press Enter after the text
    #[serde(default)]
    pub enter: bool,

    /// Wait until this text appears on the cursor line
    #[serde(default)]
    pub expect: Option<String>,

    /// Maximum seconds to wait for output (0 or absent for the default)
    #[serde(default)]
    pub max_wait: Option<f64>,
}

impl SendKeysParams {
    /// Which session the caller means.
    pub fn selector(&self) -> SessionSelector {
        SessionSelector {
            session: self.session.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

/// Parameters for tmux_send_control_keys
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SendControlKeysParams {
    /// Exact session name (takes precedence over prefix)
    #[serde(default)]
    pub session: Option<String>,

    /// Session name prefix; must match exactly one live session
    #[serde(default)]
    pub prefix: Option<String>,

    /// Fingerprint from the most recent capture of this session
    pub fingerprint: String,

    /// Whitespace-separated keys in tmux syntax (e.g. "C-c", "Escape :wq Enter"),
    /// or hex bytes (e.g. "1b 5b 41") when `hex` is set
    pub keys: String,

    /// Interpret `keys` as hex bytes
    #[serde(default)]
    pub hex: bool,

    /// Wait until this text appears on the cursor line
    #[serde(default)]
    pub expect: Option<String>,

    /// Maximum seconds to wait for output (0 or absent for the default)
    #[serde(default)]
    pub max_wait: Option<f64>,
}

impl SendControlKeysParams {
    /// Which session the caller means.
    pub fn selector(&self) -> SessionSelector {
        SessionSelector {
            session: self.session.clone(),
            prefix: self.prefix.clone(),
        }
    }
}
