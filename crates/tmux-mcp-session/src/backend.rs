//! The terminal backend seam and its tmux implementation.

use std::collections::BTreeMap;
use std::process::Command;

use tracing::{debug, trace};

use tmux_mcp_core::{Error, Result, SendMode, TmuxSettings};

/// Pane text together with the cursor position at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorCapture {
    /// Visible pane text
    pub text: String,
    /// Cursor row, 0-based from the top of the pane
    pub row: usize,
    /// Cursor column, 0-based
    pub col: usize,
}

/// Everything the engine needs from a terminal multiplexer.
///
/// Implementations are called from blocking worker threads and must be
/// shareable between them.
pub trait TerminalBackend: Send + Sync {
    /// Names of all live sessions.
    fn list(&self) -> Result<Vec<String>>;

    /// Visible pane text of a session.
    fn capture(&self, session: &str) -> Result<String>;

    /// Visible pane text plus cursor position.
    fn capture_with_cursor(&self, session: &str) -> Result<CursorCapture>;

    /// Send already-validated `send-keys` arguments.
    fn send(&self, session: &str, keys: &[String], mode: SendMode) -> Result<()>;

    /// Create a detached session running `command` (the default shell if empty).
    fn create(&self, name: &str, command: &[String], env: &BTreeMap<String, String>)
        -> Result<()>;

    /// Destroy a session.
    fn destroy(&self, session: &str) -> Result<()>;
}

/// [`TerminalBackend`] that shells out to the `tmux` binary.
#[derive(Debug, Clone)]
pub struct TmuxBackend {
    binary: String,
    socket: Option<String>,
}

impl Default for TmuxBackend {
    fn default() -> Self {
        Self::from_settings(&TmuxSettings::default())
    }
}

impl TmuxBackend {
    /// Backend for the configured binary and socket.
    pub fn from_settings(settings: &TmuxSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            socket: settings.socket.clone().filter(|s| !s.is_empty()),
        }
    }

    /// Run one tmux command and return its stdout.
    fn run(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        if let Some(socket) = &self.socket {
            cmd.arg("-S").arg(socket);
        }
        cmd.args(args);

        trace!("Running {} {:?}", self.binary, args);

        let output = cmd
            .output()
            .map_err(|e| Error::BackendUnavailable(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let subcommand = args.first().map(String::as_str).unwrap_or_default();
            debug!(
                "tmux {} failed: exit_code={:?}, stderr={}",
                subcommand,
                output.status.code(),
                stderr.trim()
            );
            return Err(Error::BackendUnavailable(format!(
                "{subcommand} failed ({}): {}",
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr.trim()
            )));
        }

        Ok(decode_output(&output.stdout))
    }
}

impl TerminalBackend for TmuxBackend {
    fn list(&self) -> Result<Vec<String>> {
        let stdout = self.run(&args(&["list-sessions", "-F", "#{session_name}"]))?;
        Ok(parse_session_list(&stdout))
    }

    fn capture(&self, session: &str) -> Result<String> {
        self.run(&args(&["capture-pane", "-p", "-t", pane_target(session).as_str()]))
    }

    fn capture_with_cursor(&self, session: &str) -> Result<CursorCapture> {
        let text = self.capture(session)?;
        let position = self.run(&args(&[
            "display-message",
            "-p",
            "-t",
            pane_target(session).as_str(),
            "#{cursor_y}:#{cursor_x}",
        ]))?;
        let (row, col) = parse_cursor(&position)?;
        Ok(CursorCapture { text, row, col })
    }

    fn send(&self, session: &str, keys: &[String], mode: SendMode) -> Result<()> {
        self.run(&send_keys_args(session, keys, mode)).map(|_| ())
    }

    fn create(
        &self,
        name: &str,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.run(&new_session_args(name, command, env)).map(|_| ())
    }

    fn destroy(&self, session: &str) -> Result<()> {
        self.run(&args(&["kill-session", "-t", session_target(session).as_str()]))
            .map(|_| ())
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Exact-match session target. A bare name would let tmux fall back to
/// prefix matching, so `work-bash-1` could hit `work-bash-10`.
pub fn session_target(session: &str) -> String {
    format!("={session}")
}

/// Active pane of the exact-match session.
pub fn pane_target(session: &str) -> String {
    format!("={session}:")
}

/// Pane text as a `String`.
///
/// Bytes that are not valid UTF-8 become U+FFFD, so fingerprints cover the
/// decoded text rather than the raw bytes. The mapping is deterministic:
/// unchanged pane bytes always decode, and therefore fingerprint, the same.
pub fn decode_output(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout).into_owned()
}

/// Arguments for `send-keys`: target, mode flag, then the payload words.
pub fn send_keys_args(session: &str, keys: &[String], mode: SendMode) -> Vec<String> {
    let mut out = args(&["send-keys", "-t", pane_target(session).as_str()]);
    if let Some(flag) = mode.flag() {
        out.push(flag.to_string());
    }
    out.extend(keys.iter().cloned());
    out
}

/// Arguments for `new-session`: detached, named, one `-e` per variable.
pub fn new_session_args(
    name: &str,
    command: &[String],
    env: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut out = args(&["new-session", "-d", "-s", name]);
    for (key, value) in env {
        out.push("-e".to_string());
        out.push(format!("{key}={value}"));
    }
    out.extend(command.iter().cloned());
    out
}

/// Session names from `list-sessions -F "#{session_name}"` output.
pub fn parse_session_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `"<row>:<col>"` as printed by `display-message`.
pub fn parse_cursor(output: &str) -> Result<(usize, usize)> {
    let trimmed = output.trim();
    let invalid = || Error::BackendUnavailable(format!("invalid cursor position '{trimmed}'"));

    let (row, col) = trimmed.split_once(':').ok_or_else(invalid)?;
    let row = row.parse::<usize>().map_err(|_| invalid())?;
    let col = col.parse::<usize>().map_err(|_| invalid())?;
    Ok((row, col))
}
