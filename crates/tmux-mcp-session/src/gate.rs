//! Fingerprint check in front of every mutating action.

use std::sync::Arc;

use tracing::{debug, warn};

use tmux_mcp_core::{CaptureSnapshot, Error, Fingerprint, Result};

use crate::backend::TerminalBackend;

/// Rejects actions whose caller last saw a different pane than the one
/// that exists now.
pub struct SafetyGate {
    backend: Arc<dyn TerminalBackend>,
}

impl SafetyGate {
    /// Gate over `backend`.
    pub fn new(backend: Arc<dyn TerminalBackend>) -> Self {
        Self { backend }
    }

    /// Capture `session` now and compare against the caller's fingerprint.
    ///
    /// Returns the fresh snapshot when they agree.
    pub fn verify(&self, session: &str, supplied: &Fingerprint) -> Result<CaptureSnapshot> {
        if supplied.is_empty() {
            return Err(Error::InvalidInput(
                "fingerprint is required. Capture the session first and pass the returned fingerprint"
                    .to_string(),
            ));
        }

        let snapshot = CaptureSnapshot::new(session, self.backend.capture(session)?);

        if snapshot.fingerprint != *supplied {
            warn!(
                "Fingerprint mismatch on {}: expected {}, got {}",
                session, supplied, snapshot.fingerprint
            );
            return Err(Error::Mismatch {
                expected: supplied.clone(),
                actual: snapshot.fingerprint,
            });
        }

        debug!("Fingerprint {} verified on {}", supplied, session);
        Ok(snapshot)
    }

    /// Run `action` only if [`verify`](Self::verify) passes.
    pub fn guarded<T, F>(&self, session: &str, supplied: &Fingerprint, action: F) -> Result<T>
    where
        F: FnOnce(&CaptureSnapshot) -> Result<T>,
    {
        let snapshot = self.verify(session, supplied)?;
        action(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use tmux_mcp_core::SendMode;

    fn setup(text: &str) -> (Arc<FakeBackend>, SafetyGate) {
        let backend = Arc::new(FakeBackend::new());
        backend.add_session("s", text);
        let gate = SafetyGate::new(backend.clone());
        (backend, gate)
    }

    #[test]
    fn test_verify_accepts_current_fingerprint() {
        let (_backend, gate) = setup("$ ");
        let snapshot = gate.verify("s", &Fingerprint::of(b"$ ")).unwrap();
        assert_eq!(snapshot.raw_text, "$ ");
    }

    #[test]
    fn test_verify_rejects_stale_fingerprint() {
        let (backend, gate) = setup("$ ");
        let stale = Fingerprint::of(b"$ ");
        backend.set_text("s", "$ make\n");

        match gate.verify("s", &stale) {
            Err(Error::Mismatch { expected, actual }) => {
                assert_eq!(expected, stale);
                assert_eq!(actual, Fingerprint::of(b"$ make\n"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_fingerprint_rejected_before_capture() {
        let (backend, gate) = setup("$ ");
        let err = gate.verify("s", &Fingerprint::from_token("  ")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(backend.capture_calls(), 0);
    }

    #[test]
    fn test_guarded_skips_action_on_mismatch() {
        let (backend, gate) = setup("$ ");
        let stale = Fingerprint::of(b"something else");

        let result = gate.guarded("s", &stale, |_| {
            backend.send("s", &["rm -rf build".to_string()], SendMode::Literal)
        });

        assert!(matches!(result, Err(Error::Mismatch { .. })));
        assert_eq!(backend.mutate_calls(), 0);
    }

    #[test]
    fn test_guarded_runs_action_on_match() {
        let (backend, gate) = setup("$ ");
        gate.guarded("s", &Fingerprint::of(b"$ "), |snapshot| {
            assert_eq!(snapshot.session_name, "s");
            backend.send("s", &["ls".to_string()], SendMode::Literal)
        })
        .unwrap();
        assert_eq!(backend.mutate_calls(), 1);
    }

    #[test]
    fn test_missing_session_is_backend_error() {
        let (_backend, gate) = setup("$ ");
        let err = gate.verify("gone", &Fingerprint::of(b"$ ")).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }
}
