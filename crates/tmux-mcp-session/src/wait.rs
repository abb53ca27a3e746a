//! Polling loops that decide when captured output is ready to return.
//!
//! Both waiters follow the same tick: check for cancellation, sleep one
//! poll interval, check the overall deadline, then capture. Time is read
//! only through the injected [`Clock`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tmux_mcp_core::{CaptureSnapshot, Error, Result, WaitSettings};

use crate::backend::TerminalBackend;
use crate::clock::Clock;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    /// Expected text appeared on the cursor line
    Matched,
    /// Output stopped changing for the debounce window
    Stable,
    /// Overall deadline reached; the snapshot is the latest capture
    DeadlineDegraded,
    /// Output stopped changing before the expected text appeared
    Stalled,
    /// Caller cancelled the wait
    Cancelled,
}

/// Result of a wait, successful or not.
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    /// Best capture available when the wait ended
    pub snapshot: CaptureSnapshot,
    /// Why the wait ended
    pub kind: WaitKind,
    /// Time from the start of the wait to its end
    pub waited: Duration,
}

impl WaitOutcome {
    fn new(snapshot: CaptureSnapshot, kind: WaitKind, waited: Duration) -> Self {
        Self {
            snapshot,
            kind,
            waited,
        }
    }

    fn waited_ms(&self) -> u64 {
        self.waited.as_millis() as u64
    }

    /// Accept the outcome of a stability wait.
    ///
    /// A deadline still yields the latest output; only cancellation fails.
    pub fn into_settled(self) -> Result<WaitOutcome> {
        match self.kind {
            WaitKind::Cancelled => Err(Error::Cancelled {
                waited_ms: self.waited_ms(),
                snapshot: Some(Box::new(self.snapshot)),
            }),
            _ => Ok(self),
        }
    }

    /// Accept the outcome of an expectation wait.
    ///
    /// Anything but a match is an error carrying the last snapshot.
    pub fn into_expected(self, expected: &str, settings: &WaitSettings) -> Result<WaitOutcome> {
        let waited_ms = self.waited_ms();
        match self.kind {
            WaitKind::Matched | WaitKind::Stable => Ok(self),
            WaitKind::DeadlineDegraded => Err(Error::DeadlineExceeded {
                expected: expected.to_string(),
                waited_ms,
                snapshot: Box::new(self.snapshot),
            }),
            WaitKind::Stalled => Err(Error::StalledNoOutput {
                expected: expected.to_string(),
                stalled_ms: settings.no_output_timeout_ms,
                snapshot: Box::new(self.snapshot),
            }),
            WaitKind::Cancelled => Err(Error::Cancelled {
                waited_ms,
                snapshot: Some(Box::new(self.snapshot)),
            }),
        }
    }
}

enum Tick {
    Cancelled(Duration),
    Deadline(Duration),
    Due(Instant),
}

/// Shared tick bookkeeping for both waiters.
struct Poller<'a> {
    clock: &'a dyn Clock,
    cancel: &'a CancellationToken,
    poll_interval: Duration,
    start: Instant,
    deadline: Duration,
    max_failures: u32,
    consecutive_failures: u32,
    last_good: Option<CaptureSnapshot>,
}

impl<'a> Poller<'a> {
    fn new(
        clock: &'a dyn Clock,
        cancel: &'a CancellationToken,
        settings: &WaitSettings,
        deadline: Duration,
    ) -> Self {
        Self {
            clock,
            cancel,
            poll_interval: settings.poll_interval(),
            start: clock.now(),
            deadline,
            max_failures: settings.max_consecutive_capture_failures,
            consecutive_failures: 0,
            last_good: None,
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    fn next(&mut self) -> Tick {
        if self.cancel.is_cancelled() {
            return Tick::Cancelled(self.elapsed(self.clock.now()));
        }
        self.clock.sleep(self.poll_interval);

        let now = self.clock.now();
        if self.cancel.is_cancelled() {
            return Tick::Cancelled(self.elapsed(now));
        }
        if self.elapsed(now) >= self.deadline {
            return Tick::Deadline(self.elapsed(now));
        }
        Tick::Due(now)
    }

    /// Record a capture result.
    ///
    /// `Ok(None)` means the failure is tolerated and the tick is skipped.
    fn observe(&mut self, capture: Result<CaptureSnapshot>) -> Result<Option<CaptureSnapshot>> {
        match capture {
            Ok(snapshot) => {
                self.consecutive_failures = 0;
                self.last_good = Some(snapshot.clone());
                Ok(Some(snapshot))
            }
            Err(e) if self.last_good.is_none() => Err(e),
            Err(e) => {
                self.consecutive_failures += 1;
                debug!(
                    "Capture failed ({} in a row), skipping tick: {}",
                    self.consecutive_failures, e
                );
                if self.consecutive_failures >= self.max_failures {
                    warn!(
                        "Giving up after {} consecutive capture failures",
                        self.consecutive_failures
                    );
                    return Err(Error::BackendUnavailable(format!(
                        "{} consecutive capture failures, last: {e}",
                        self.consecutive_failures
                    )));
                }
                Ok(None)
            }
        }
    }

    /// Outcome for a cancelled wait.
    fn cancelled(self, waited: Duration) -> Result<WaitOutcome> {
        debug!("Wait cancelled after {:?}", waited);
        match self.last_good {
            Some(snapshot) => Ok(WaitOutcome::new(snapshot, WaitKind::Cancelled, waited)),
            None => Err(Error::Cancelled {
                waited_ms: waited.as_millis() as u64,
                snapshot: None,
            }),
        }
    }

    /// Outcome for the deadline, given one last capture attempt.
    fn degraded(
        self,
        final_capture: Result<CaptureSnapshot>,
        waited: Duration,
    ) -> Result<WaitOutcome> {
        match (final_capture, self.last_good) {
            (Ok(snapshot), _) | (Err(_), Some(snapshot)) => Ok(WaitOutcome::new(
                snapshot,
                WaitKind::DeadlineDegraded,
                waited,
            )),
            (Err(e), None) => Err(e),
        }
    }
}

fn effective_deadline(requested: Option<Duration>, default: Duration) -> Duration {
    requested.filter(|d| !d.is_zero()).unwrap_or(default)
}

/// Waits until a session's output stops changing.
pub struct QuiescenceWaiter {
    backend: Arc<dyn TerminalBackend>,
    clock: Arc<dyn Clock>,
    settings: WaitSettings,
}

impl QuiescenceWaiter {
    /// Waiter over `backend`, timed by `clock`.
    pub fn new(
        backend: Arc<dyn TerminalBackend>,
        clock: Arc<dyn Clock>,
        settings: WaitSettings,
    ) -> Self {
        Self {
            backend,
            clock,
            settings,
        }
    }

    fn capture(&self, session: &str) -> Result<CaptureSnapshot> {
        self.backend
            .capture(session)
            .map(|text| CaptureSnapshot::new(session, text))
    }

    /// Poll `session` until its text has been identical for the debounce
    /// window, or `deadline` (default from settings) passes.
    pub fn wait(
        &self,
        session: &str,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let deadline = effective_deadline(deadline, self.settings.stability_timeout());
        let debounce = self.settings.stability_threshold();
        let mut poller = Poller::new(self.clock.as_ref(), cancel, &self.settings, deadline);

        let mut last_text: Option<String> = None;
        let mut last_change = poller.start;

        loop {
            let now = match poller.next() {
                Tick::Cancelled(waited) => return poller.cancelled(waited),
                Tick::Deadline(waited) => {
                    debug!("Stability deadline reached on {} after {:?}", session, waited);
                    let final_capture = self.capture(session);
                    return poller.degraded(final_capture, waited);
                }
                Tick::Due(now) => now,
            };

            let Some(snapshot) = poller.observe(self.capture(session))? else {
                continue;
            };

            if last_text.as_deref() != Some(snapshot.raw_text.as_str()) {
                last_text = Some(snapshot.raw_text.clone());
                last_change = now;
            } else if now.saturating_duration_since(last_change) >= debounce {
                let waited = poller.elapsed(now);
                debug!("{} stable after {:?}", session, waited);
                return Ok(WaitOutcome::new(snapshot, WaitKind::Stable, waited));
            }
        }
    }
}

/// Waits until expected text appears on the cursor line.
pub struct ExpectationWaiter {
    backend: Arc<dyn TerminalBackend>,
    clock: Arc<dyn Clock>,
    settings: WaitSettings,
}

impl ExpectationWaiter {
    /// Waiter over `backend`, timed by `clock`.
    pub fn new(
        backend: Arc<dyn TerminalBackend>,
        clock: Arc<dyn Clock>,
        settings: WaitSettings,
    ) -> Self {
        Self {
            backend,
            clock,
            settings,
        }
    }

    fn capture(&self, session: &str) -> Result<CaptureSnapshot> {
        self.backend
            .capture_with_cursor(session)
            .map(|c| CaptureSnapshot::with_cursor(session, c.text, c.row, c.col))
    }

    /// Poll `session` until `expected` is on the cursor line.
    ///
    /// Ends early as [`WaitKind::Stalled`] when the output has not changed
    /// for the stall threshold, and as [`WaitKind::DeadlineDegraded`] when
    /// `deadline` (default from settings) passes.
    pub fn wait(
        &self,
        session: &str,
        expected: &str,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let deadline = effective_deadline(deadline, self.settings.expect_timeout());
        let stall = self.settings.no_output_timeout();
        let mut poller = Poller::new(self.clock.as_ref(), cancel, &self.settings, deadline);

        let mut last_text: Option<String> = None;
        let mut last_change = poller.start;

        loop {
            let now = match poller.next() {
                Tick::Cancelled(waited) => return poller.cancelled(waited),
                Tick::Deadline(waited) => {
                    debug!(
                        "Deadline reached on {} waiting for '{}' after {:?}",
                        session, expected, waited
                    );
                    let final_capture = self.capture(session);
                    if let Ok(snapshot) = &final_capture {
                        if snapshot.cursor_line.contains(expected) {
                            return Ok(WaitOutcome::new(
                                snapshot.clone(),
                                WaitKind::Matched,
                                waited,
                            ));
                        }
                    }
                    return poller.degraded(final_capture, waited);
                }
                Tick::Due(now) => now,
            };

            let Some(snapshot) = poller.observe(self.capture(session))? else {
                continue;
            };
            let waited = poller.elapsed(now);

            if snapshot.cursor_line.contains(expected) {
                debug!("Found '{}' on {} after {:?}", expected, session, waited);
                return Ok(WaitOutcome::new(snapshot, WaitKind::Matched, waited));
            }

            if last_text.as_deref() != Some(snapshot.raw_text.as_str()) {
                last_text = Some(snapshot.raw_text.clone());
                last_change = now;
            } else if now.saturating_duration_since(last_change) >= stall {
                debug!(
                    "No output on {} for {:?} while waiting for '{}'",
                    session, stall, expected
                );
                return Ok(WaitOutcome::new(snapshot, WaitKind::Stalled, waited));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, ManualClock};

    fn settings() -> WaitSettings {
        WaitSettings::default()
    }

    fn quiescence(backend: &Arc<FakeBackend>, clock: &Arc<ManualClock>) -> QuiescenceWaiter {
        QuiescenceWaiter::new(backend.clone(), clock.clone(), settings())
    }

    fn expectation(backend: &Arc<FakeBackend>, clock: &Arc<ManualClock>) -> ExpectationWaiter {
        ExpectationWaiter::new(backend.clone(), clock.clone(), settings())
    }

    #[test]
    fn test_stable_after_debounce() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "a");
        backend.push_frames("s", &["a", "ab", "abc"]);
        let clock = Arc::new(ManualClock::new());

        let outcome = quiescence(&backend, &clock)
            .wait("s", None, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::Stable);
        assert_eq!(outcome.snapshot.raw_text, "abc");
        // last change seen at 600ms, stable once 500ms have passed since
        assert_eq!(outcome.waited, Duration::from_millis(1200));
    }

    #[test]
    fn test_never_stable_before_debounce() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "$ ");
        let clock = Arc::new(ManualClock::new());

        let outcome = quiescence(&backend, &clock)
            .wait("s", None, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::Stable);
        // first capture at 200ms, debounce elapses at 700ms, next tick is 800ms
        assert_eq!(outcome.waited, Duration::from_millis(800));
    }

    #[test]
    fn test_deadline_degrades_with_latest_output() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "0");
        backend.set_ticking("s", true);
        let clock = Arc::new(ManualClock::new());

        let outcome = quiescence(&backend, &clock)
            .wait("s", Some(Duration::from_secs(2)), &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::DeadlineDegraded);
        assert_eq!(outcome.waited, Duration::from_secs(2));
        assert!(outcome.clone().into_settled().is_ok());
    }

    #[test]
    fn test_zero_deadline_uses_default() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "0");
        backend.set_ticking("s", true);
        let clock = Arc::new(ManualClock::new());

        let outcome = quiescence(&backend, &clock)
            .wait("s", Some(Duration::ZERO), &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::DeadlineDegraded);
        assert_eq!(outcome.waited, Duration::from_secs(10));
    }

    #[test]
    fn test_first_capture_failure_is_returned() {
        let backend = Arc::new(FakeBackend::new());
        let clock = Arc::new(ManualClock::new());

        let err = quiescence(&backend, &clock)
            .wait("missing", None, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[test]
    fn test_transient_failures_are_skipped() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "$ ");
        let clock = Arc::new(ManualClock::new());
        let waiter = quiescence(&backend, &clock);

        // one good capture, then three failures, then recovery
        backend.fail_captures_after("s", 1, 3);
        let outcome = waiter.wait("s", None, &CancellationToken::new()).unwrap();

        assert_eq!(outcome.kind, WaitKind::Stable);
        assert_eq!(outcome.snapshot.raw_text, "$ ");
    }

    #[test]
    fn test_repeated_failures_escalate() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "$ ");
        backend.fail_captures_after("s", 1, 100);
        let clock = Arc::new(ManualClock::new());

        let err = quiescence(&backend, &clock)
            .wait("s", None, &CancellationToken::new())
            .unwrap_err();
        match err {
            Error::BackendUnavailable(msg) => assert!(msg.starts_with("10 consecutive")),
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[test]
    fn test_cancel_before_any_capture() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "$ ");
        let clock = Arc::new(ManualClock::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = quiescence(&backend, &clock)
            .wait("s", None, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { snapshot: None, .. }));
        assert_eq!(backend.capture_calls(), 0);
    }

    #[test]
    fn test_cancel_mid_wait_keeps_snapshot() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "0");
        backend.set_ticking("s", true);
        let cancel = CancellationToken::new();
        let clock = Arc::new(ManualClock::new().cancel_at(Duration::from_millis(1000), cancel.clone()));

        let outcome = quiescence(&backend, &clock)
            .wait("s", None, &cancel)
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::Cancelled);
        assert_eq!(outcome.waited, Duration::from_millis(1000));
        match outcome.into_settled() {
            Err(Error::Cancelled { snapshot, .. }) => assert!(snapshot.is_some()),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn test_expected_on_cursor_line_matches() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "$ ");
        backend.push_frames("s", &["$ make\nbuilding\n", "$ make\nbuilding\ndone\n$ "]);
        let clock = Arc::new(ManualClock::new());

        let outcome = expectation(&backend, &clock)
            .wait("s", "$", None, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::Matched);
        assert_eq!(outcome.snapshot.cursor_line, "$ ");
        assert_eq!(outcome.waited, Duration::from_millis(400));
    }

    #[test]
    fn test_pinned_cursor_selects_line() {
        let backend = Arc::new(FakeBackend::new());
        // full-screen program: cursor parked on the prompt row, not the last line
        backend.add_session("s", ":wq ready\n~\n~\n");
        backend.set_cursor("s", 0, 9);
        let clock = Arc::new(ManualClock::new());

        let outcome = expectation(&backend, &clock)
            .wait("s", "ready", None, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::Matched);
        assert_eq!(outcome.snapshot.cursor_line, ":wq ready");
        assert_eq!(outcome.snapshot.cursor_row, 0);
        assert_eq!(outcome.snapshot.cursor_col, 9);
    }

    #[test]
    fn test_scrollback_never_matches() {
        let backend = Arc::new(FakeBackend::new());
        // "ready" is above the cursor, the cursor sits on an empty line
        backend.add_session("s", "server ready\n");
        let clock = Arc::new(ManualClock::new());

        let outcome = expectation(&backend, &clock)
            .wait("s", "ready", None, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::Stalled);
        let err = outcome.into_expected("ready", &settings()).unwrap_err();
        assert!(matches!(err, Error::StalledNoOutput { stalled_ms: 20000, .. }));
        assert!(err.snapshot().is_some());
    }

    #[test]
    fn test_stall_fires_after_threshold() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "$ sleep 100\n");
        let clock = Arc::new(ManualClock::new());

        let outcome = expectation(&backend, &clock)
            .wait("s", "done", None, &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::Stalled);
        // first capture at 200ms resets the stall clock
        assert_eq!(outcome.waited, Duration::from_millis(20_200));
    }

    #[test]
    fn test_deadline_independent_of_output() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", "0");
        backend.set_ticking("s", true);
        let clock = Arc::new(ManualClock::new());

        let outcome = expectation(&backend, &clock)
            .wait("s", "never", Some(Duration::from_secs(3)), &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.kind, WaitKind::DeadlineDegraded);
        assert_eq!(outcome.waited, Duration::from_secs(3));
        let err = outcome.into_expected("never", &settings()).unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { waited_ms: 3000, .. }));
    }
}
