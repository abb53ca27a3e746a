//! Session manager tying identity, the safety gate and the waiters together.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tmux_mcp_core::{
    parse_keys, CaptureSnapshot, Error, Fingerprint, Result, SendMode, ServerConfig,
    SessionSelector,
};

use crate::backend::{TerminalBackend, TmuxBackend};
use crate::clock::{Clock, SystemClock};
use crate::directory::SessionDirectory;
use crate::factory::{NameRegistry, SessionFactory, SuffixStrategy};
use crate::gate::SafetyGate;
use crate::wait::{ExpectationWaiter, QuiescenceWaiter, WaitOutcome};

/// Parameters for creating a session.
#[derive(Debug, Clone, Default)]
pub struct NewSessionRequest {
    /// Program and arguments (the default shell if empty)
    pub command: Vec<String>,
    /// Name prefix (the default prefix if absent)
    pub prefix: Option<String>,
    /// Extra environment for the session
    pub env: BTreeMap<String, String>,
    /// Wait for this text on the cursor line instead of for stable output
    pub expect: Option<String>,
    /// Override the wait deadline
    pub max_wait: Option<Duration>,
    /// Destroy existing sessions with the same prefix first
    pub kill_others: bool,
    /// Fingerprint of each session `kill_others` destroys, keyed by name
    pub kill_fingerprints: BTreeMap<String, Fingerprint>,
    /// Allow creation next to existing sessions with the same prefix
    pub allow_multiple: bool,
}

/// Parameters for sending input to a session.
#[derive(Debug, Clone)]
pub struct SendKeysRequest {
    /// Target session
    pub target: SessionSelector,
    /// Fingerprint of the caller's last capture
    pub fingerprint: Fingerprint,
    /// Payload, interpreted according to `mode`
    pub keys: String,
    /// How tmux interprets `keys`
    pub mode: SendMode,
    /// Press Enter after the payload
    pub enter: bool,
    /// Wait for this text on the cursor line instead of for stable output
    pub expect: Option<String>,
    /// Override the wait deadline
    pub max_wait: Option<Duration>,
}

impl SendKeysRequest {
    /// Literal text for `target`, gated on `fingerprint`.
    pub fn literal(
        target: SessionSelector,
        fingerprint: impl Into<Fingerprint>,
        keys: impl Into<String>,
    ) -> Self {
        Self {
            target,
            fingerprint: fingerprint.into(),
            keys: keys.into(),
            mode: SendMode::Literal,
            enter: false,
            expect: None,
            max_wait: None,
        }
    }
}

/// Entry point for every session operation.
pub struct SessionManager {
    backend: Arc<dyn TerminalBackend>,
    config: ServerConfig,
    directory: SessionDirectory,
    factory: SessionFactory,
    gate: SafetyGate,
    quiescence: QuiescenceWaiter,
    expectation: ExpectationWaiter,
}

impl SessionManager {
    /// Manager driving the real tmux binary.
    pub fn new(config: ServerConfig) -> Self {
        let backend = Arc::new(TmuxBackend::from_settings(&config.tmux));
        Self::with_backend(config, backend, Arc::new(SystemClock))
    }

    /// Manager over a custom backend and clock.
    pub fn with_backend(
        config: ServerConfig,
        backend: Arc<dyn TerminalBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_registry(config, backend, clock, Arc::new(NameRegistry::new()))
    }

    /// Manager sharing a name registry with other engines.
    pub fn with_registry(
        config: ServerConfig,
        backend: Arc<dyn TerminalBackend>,
        clock: Arc<dyn Clock>,
        registry: Arc<NameRegistry>,
    ) -> Self {
        Self {
            directory: SessionDirectory::new(backend.clone(), config.tmux.default_prefix.clone()),
            factory: SessionFactory::new(backend.clone(), registry, &config.session),
            gate: SafetyGate::new(backend.clone()),
            quiescence: QuiescenceWaiter::new(backend.clone(), clock.clone(), config.wait.clone()),
            expectation: ExpectationWaiter::new(backend.clone(), clock, config.wait.clone()),
            backend,
            config,
        }
    }

    /// Replace how session name suffixes are chosen.
    pub fn with_suffix_strategy(mut self, strategy: SuffixStrategy) -> Self {
        self.factory = self.factory.with_strategy(strategy);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Prefix used when a request names none.
    pub fn default_prefix(&self) -> String {
        self.directory.default_prefix()
    }

    // Engine operations

    /// Resolve a reference to exactly one live session.
    pub fn resolve_session(&self, selector: &SessionSelector) -> Result<String> {
        self.directory.resolve(selector)
    }

    /// Create a session under a fresh unique name.
    pub fn create_unique_session(
        &self,
        prefix: Option<&str>,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let prefix = self.prefix_or_default(prefix);
        self.factory.create_unique(&prefix, command, env)
    }

    /// Check the caller's fingerprint against a fresh capture.
    pub fn verify_fingerprint(
        &self,
        session: &str,
        fingerprint: &Fingerprint,
    ) -> Result<CaptureSnapshot> {
        self.gate.verify(session, fingerprint)
    }

    /// Wait for output to stop changing.
    pub fn wait_for_stability(
        &self,
        session: &str,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        self.quiescence.wait(session, max_wait, cancel)
    }

    /// Wait for `expected` on the cursor line.
    pub fn wait_for_expected(
        &self,
        session: &str,
        expected: &str,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        self.expectation.wait(session, expected, max_wait, cancel)
    }

    // Action executors

    /// Capture a session's current output.
    pub fn capture(&self, selector: &SessionSelector) -> Result<CaptureSnapshot> {
        let session = self.resolve_session(selector)?;
        let text = self.backend.capture(&session)?;
        Ok(CaptureSnapshot::new(session, text))
    }

    /// Live sessions, optionally filtered by prefix.
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        self.directory.list(prefix)
    }

    /// Create a session and wait for its first output.
    pub fn new_session(
        &self,
        request: &NewSessionRequest,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let prefix = self.prefix_or_default(request.prefix.as_deref());

        if request.kill_others {
            self.kill_prefix_matches(&prefix, &request.kill_fingerprints)?;
        }

        if !request.allow_multiple {
            if let Some(existing) = self.directory.list(Some(&prefix)).into_iter().next() {
                return Err(Error::SessionExists { prefix, existing });
            }
        }

        let session = self
            .factory
            .create_unique(&prefix, &request.command, &request.env)?;

        self.settle(
            &session,
            request.expect.as_deref(),
            request.max_wait,
            cancel,
        )
    }

    /// Send input to a session whose state the caller has seen, then wait
    /// for the resulting output.
    pub fn send_keys(
        &self,
        request: &SendKeysRequest,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let keys = parse_keys(&request.keys, request.mode)?;
        let session = self.resolve_session(&request.target)?;

        self.gate.guarded(&session, &request.fingerprint, |_| {
            self.backend.send(&session, &keys, request.mode)?;
            if request.enter {
                self.backend
                    .send(&session, &["Enter".to_string()], SendMode::Keys)?;
            }
            Ok(())
        })?;
        info!(
            "Sent {} key argument(s) to {} ({:?})",
            keys.len(),
            session,
            request.mode
        );

        self.settle(
            &session,
            request.expect.as_deref(),
            request.max_wait,
            cancel,
        )
    }

    /// Destroy a session whose state the caller has seen.
    pub fn kill(&self, selector: &SessionSelector, fingerprint: &Fingerprint) -> Result<String> {
        let session = self.resolve_session(selector)?;
        self.gate
            .guarded(&session, fingerprint, |_| self.backend.destroy(&session))?;
        info!("Killed session {}", session);
        Ok(session)
    }

    /// Destroy every session matching `prefix`, each behind the gate.
    ///
    /// Nothing is destroyed unless every match has a fingerprint.
    fn kill_prefix_matches(
        &self,
        prefix: &str,
        fingerprints: &BTreeMap<String, Fingerprint>,
    ) -> Result<()> {
        let mut targets = Vec::new();
        let mut missing = Vec::new();
        for name in self.directory.list(Some(prefix)) {
            match fingerprints.get(&name) {
                Some(fingerprint) => targets.push((name, fingerprint)),
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            warn!(
                "Refusing kill_others for prefix {}: no fingerprint for {:?}",
                prefix, missing
            );
            return Err(Error::InvalidInput(format!(
                "kill_others needs a fingerprint for every session with prefix '{prefix}'. \
                 Capture and pass kill_fingerprints for: {}",
                missing.join(", ")
            )));
        }

        for (name, fingerprint) in targets {
            self.gate
                .guarded(&name, fingerprint, |_| self.backend.destroy(&name))?;
            info!("Killed {} before creating a new {} session", name, prefix);
        }
        Ok(())
    }

    fn prefix_or_default(&self, prefix: Option<&str>) -> String {
        match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => prefix.to_string(),
            None => self.directory.default_prefix(),
        }
    }

    /// Wait for expected text when given, for stable output otherwise.
    fn settle(
        &self,
        session: &str,
        expect: Option<&str>,
        max_wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        match expect.filter(|e| !e.is_empty()) {
            Some(expected) => self
                .wait_for_expected(session, expected, max_wait, cancel)?
                .into_expected(expected, &self.config.wait),
            None => self
                .wait_for_stability(session, max_wait, cancel)?
                .into_settled(),
        }
    }
}
