//! In-memory backend and virtual clock for tests.
//!
//! Neither needs a tmux server or real time, so engine behaviour can be
//! exercised deterministically from unit and integration tests.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use tmux_mcp_core::{Error, Result, SendMode};

use crate::backend::{CursorCapture, TerminalBackend};
use crate::clock::Clock;

#[derive(Debug, Default)]
struct FakeSession {
    text: String,
    frames: VecDeque<String>,
    cursor: Option<(usize, usize)>,
    ticking: bool,
    ticks: u64,
    env: BTreeMap<String, String>,
    command: Vec<String>,
    ok_before_failing: u32,
    failures_left: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    sessions: BTreeMap<String, FakeSession>,
    rejected_names: HashSet<String>,
    fail_creates: bool,
    fail_list: bool,
    capture_calls: usize,
    create_calls: usize,
    sent: Vec<(String, Vec<String>, SendMode)>,
    destroyed: Vec<String>,
}

/// [`TerminalBackend`] holding sessions in memory.
///
/// Sending keys appends the payload to the session text, so a send is
/// visible in the next capture. Queued frames replace the text one per
/// capture. Unless a cursor is pinned, it sits at the end of the last line.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    /// Backend with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn with_session<T>(&self, name: &str, f: impl FnOnce(&mut FakeSession) -> T) -> T {
        self.with_state(|state| {
            let session = state.sessions.entry(name.to_string()).or_default();
            f(session)
        })
    }

    /// Add a live session showing `text`.
    pub fn add_session(&self, name: &str, text: &str) {
        self.with_session(name, |s| s.text = text.to_string());
    }

    /// Whether `name` is live.
    pub fn has_session(&self, name: &str) -> bool {
        self.with_state(|state| state.sessions.contains_key(name))
    }

    /// Replace a session's text, as if its program printed something.
    pub fn set_text(&self, name: &str, text: &str) {
        self.with_session(name, |s| s.text = text.to_string());
    }

    /// Current text of a session.
    pub fn text(&self, name: &str) -> Option<String> {
        self.with_state(|state| state.sessions.get(name).map(|s| s.text.clone()))
    }

    /// Queue texts that successive captures will show, one per capture.
    pub fn push_frames(&self, name: &str, frames: &[&str]) {
        self.with_session(name, |s| {
            s.frames.extend(frames.iter().map(|f| f.to_string()));
        });
    }

    /// Make every capture show new text (a counter), so output never settles.
    pub fn set_ticking(&self, name: &str, ticking: bool) {
        self.with_session(name, |s| s.ticking = ticking);
    }

    /// Pin the cursor position reported for a session.
    pub fn set_cursor(&self, name: &str, row: usize, col: usize) {
        self.with_session(name, |s| s.cursor = Some((row, col)));
    }

    /// Let `ok` captures succeed, then fail the next `failures`.
    pub fn fail_captures_after(&self, name: &str, ok: u32, failures: u32) {
        self.with_session(name, |s| {
            s.ok_before_failing = ok;
            s.failures_left = failures;
        });
    }

    /// Make the backend refuse to create `name`.
    pub fn reject_name(&self, name: &str) {
        self.with_state(|state| {
            state.rejected_names.insert(name.to_string());
        });
    }

    /// Make every create fail.
    pub fn fail_creates(&self, fail: bool) {
        self.with_state(|state| state.fail_creates = fail);
    }

    /// Make listing fail, as when no tmux server is running.
    pub fn fail_list(&self, fail: bool) {
        self.with_state(|state| state.fail_list = fail);
    }

    /// Number of capture calls, with or without cursor.
    pub fn capture_calls(&self) -> usize {
        self.with_state(|state| state.capture_calls)
    }

    /// Number of create calls, successful or not.
    pub fn create_calls(&self) -> usize {
        self.with_state(|state| state.create_calls)
    }

    /// Number of calls that changed a session: sends and destroys.
    pub fn mutate_calls(&self) -> usize {
        self.with_state(|state| state.sent.len() + state.destroyed.len())
    }

    /// Every send, in order.
    pub fn sent(&self) -> Vec<(String, Vec<String>, SendMode)> {
        self.with_state(|state| state.sent.clone())
    }

    /// Every destroyed session, in order.
    pub fn destroyed(&self) -> Vec<String> {
        self.with_state(|state| state.destroyed.clone())
    }

    /// Environment a session was created with.
    pub fn session_env(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.with_state(|state| state.sessions.get(name).map(|s| s.env.clone()))
    }

    /// Command a session was created with.
    pub fn session_command(&self, name: &str) -> Option<Vec<String>> {
        self.with_state(|state| state.sessions.get(name).map(|s| s.command.clone()))
    }

    fn next_text(&self, name: &str) -> Result<(String, Option<(usize, usize)>)> {
        self.with_state(|state| {
            state.capture_calls += 1;
            let session = state
                .sessions
                .get_mut(name)
                .ok_or_else(|| Error::BackendUnavailable(format!("can't find session: {name}")))?;

            if session.ok_before_failing > 0 {
                session.ok_before_failing -= 1;
            } else if session.failures_left > 0 {
                session.failures_left -= 1;
                return Err(Error::BackendUnavailable(format!(
                    "capture of {name} failed"
                )));
            }

            if let Some(frame) = session.frames.pop_front() {
                session.text = frame;
            } else if session.ticking {
                session.ticks += 1;
                session.text = session.ticks.to_string();
            }

            Ok((session.text.clone(), session.cursor))
        })
    }
}

/// Cursor at the end of the last line of `text`.
fn end_of_text(text: &str) -> (usize, usize) {
    let row = text.matches('\n').count();
    let col = text.rsplit('\n').next().map_or(0, |line| line.chars().count());
    (row, col)
}

impl TerminalBackend for FakeBackend {
    fn list(&self) -> Result<Vec<String>> {
        self.with_state(|state| {
            if state.fail_list {
                return Err(Error::BackendUnavailable(
                    "no server running".to_string(),
                ));
            }
            Ok(state.sessions.keys().cloned().collect())
        })
    }

    fn capture(&self, session: &str) -> Result<String> {
        self.next_text(session).map(|(text, _)| text)
    }

    fn capture_with_cursor(&self, session: &str) -> Result<CursorCapture> {
        let (text, cursor) = self.next_text(session)?;
        let (row, col) = cursor.unwrap_or_else(|| end_of_text(&text));
        Ok(CursorCapture { text, row, col })
    }

    fn send(&self, session: &str, keys: &[String], mode: SendMode) -> Result<()> {
        self.with_state(|state| {
            let target = state
                .sessions
                .get_mut(session)
                .ok_or_else(|| Error::BackendUnavailable(format!("can't find session: {session}")))?;

            match mode {
                SendMode::Keys if keys.len() == 1 && keys[0] == "Enter" => target.text.push('\n'),
                SendMode::Hex => {}
                _ => target.text.push_str(&keys.join(" ")),
            }

            state
                .sent
                .push((session.to_string(), keys.to_vec(), mode));
            Ok(())
        })
    }

    fn create(
        &self,
        name: &str,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.with_state(|state| {
            state.create_calls += 1;
            if state.fail_creates || state.rejected_names.contains(name) {
                return Err(Error::BackendUnavailable(format!(
                    "duplicate session: {name}"
                )));
            }
            if state.sessions.contains_key(name) {
                return Err(Error::BackendUnavailable(format!(
                    "duplicate session: {name}"
                )));
            }
            state.sessions.insert(
                name.to_string(),
                FakeSession {
                    text: "$ ".to_string(),
                    env: env.clone(),
                    command: command.to_vec(),
                    ..FakeSession::default()
                },
            );
            Ok(())
        })
    }

    fn destroy(&self, session: &str) -> Result<()> {
        self.with_state(|state| {
            if state.sessions.remove(session).is_none() {
                return Err(Error::BackendUnavailable(format!(
                    "can't find session: {session}"
                )));
            }
            state.destroyed.push(session.to_string());
            Ok(())
        })
    }
}

#[derive(Debug)]
struct ManualClockState {
    elapsed: Duration,
    cancel_at: Option<(Duration, CancellationToken)>,
}

/// [`Clock`] whose time only moves when something sleeps on it.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualClockState>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualClockState {
                elapsed: Duration::ZERO,
                cancel_at: None,
            }),
        }
    }

    /// Cancel `token` once virtual time reaches `at`.
    pub fn cancel_at(self, at: Duration, token: CancellationToken) -> Self {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.cancel_at = Some((at, token));
        }
        self
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).elapsed
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed += by;
        if let Some((at, token)) = &state.cancel_at {
            if state.elapsed >= *at {
                token.cancel();
            }
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
