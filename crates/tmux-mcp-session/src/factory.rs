//! Unique session creation.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;
use tracing::{debug, info, warn};

use tmux_mcp_core::{base_name, Error, Result, SessionSettings};

use crate::backend::TerminalBackend;

/// Names this process has handed out.
///
/// Shared by every factory of one engine so two concurrent creations can
/// never both claim the same name, even before tmux has seen either.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: Mutex<HashSet<String>>,
}

impl NameRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`. Returns `false` if it was already claimed.
    pub fn try_reserve(&self, name: &str) -> bool {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        names.insert(name.to_string())
    }

    /// Give a claim back after the backend refused the name.
    pub fn release(&self, name: &str) {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        names.remove(name);
    }

    /// Whether `name` is currently claimed.
    pub fn contains(&self, name: &str) -> bool {
        let names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        names.contains(name)
    }

    /// Number of claimed names.
    pub fn len(&self) -> usize {
        self.names.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been claimed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How the numeric suffix of a session name is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixStrategy {
    /// Uniform in `min..=max`
    Random {
        /// Smallest suffix
        min: u32,
        /// Largest suffix
        max: u32,
    },
    /// `start`, `start + 1`, ...
    Incrementing {
        /// First suffix
        start: u32,
    },
}

impl SuffixStrategy {
    /// Random suffixes over the configured range.
    pub fn from_settings(settings: &SessionSettings) -> Self {
        SuffixStrategy::Random {
            min: settings.suffix_min,
            max: settings.suffix_max,
        }
    }
}

/// Creates sessions under names no other caller of this process holds.
pub struct SessionFactory {
    backend: Arc<dyn TerminalBackend>,
    registry: Arc<NameRegistry>,
    strategy: SuffixStrategy,
    counter: AtomicU32,
    max_attempts: u32,
}

impl SessionFactory {
    /// Factory using random suffixes from `settings`.
    pub fn new(
        backend: Arc<dyn TerminalBackend>,
        registry: Arc<NameRegistry>,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            backend,
            registry,
            strategy: SuffixStrategy::from_settings(settings),
            counter: AtomicU32::new(0),
            max_attempts: settings.max_creation_attempts,
        }
    }

    /// Replace the suffix strategy.
    pub fn with_strategy(mut self, strategy: SuffixStrategy) -> Self {
        if let SuffixStrategy::Incrementing { start } = strategy {
            self.counter = AtomicU32::new(start);
        }
        self.strategy = strategy;
        self
    }

    /// The registry this factory reserves names in.
    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }

    fn next_suffix(&self) -> u32 {
        match self.strategy {
            SuffixStrategy::Random { min, max } => rand::thread_rng().gen_range(min..=max),
            SuffixStrategy::Incrementing { .. } => self.counter.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Create a session named `<prefix>-<command token>-<suffix>`.
    ///
    /// A name already reserved in the registry, or refused by the backend,
    /// costs one attempt and a fresh suffix is drawn.
    pub fn create_unique(
        &self,
        prefix: &str,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let base = base_name(prefix, command);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            let name = format!("{base}-{}", self.next_suffix());

            if !self.registry.try_reserve(&name) {
                debug!("Attempt {}: name {} already reserved", attempt, name);
                continue;
            }

            match self.backend.create(&name, command, env) {
                Ok(()) => {
                    info!("Created session {} (attempt {})", name, attempt);
                    return Ok(name);
                }
                Err(e) => {
                    debug!("Attempt {}: backend refused {}: {}", attempt, name, e);
                    self.registry.release(&name);
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            warn!(
                "Giving up on {} after {} attempts, last error: {}",
                base, self.max_attempts, e
            );
        }
        Err(Error::CreationExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn settings(attempts: u32) -> SessionSettings {
        SessionSettings {
            max_creation_attempts: attempts,
            ..SessionSettings::default()
        }
    }

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_registry_reserve_and_release() {
        let registry = NameRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.try_reserve("a"));
        assert!(!registry.try_reserve("a"));
        assert!(registry.contains("a"));
        registry.release("a");
        assert!(!registry.contains("a"));
        assert!(registry.try_reserve("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_random_name_shape() {
        let backend = Arc::new(FakeBackend::new());
        let factory = SessionFactory::new(
            backend.clone(),
            Arc::new(NameRegistry::new()),
            &SessionSettings::default(),
        );

        let name = factory
            .create_unique("work", &cmd(&["/usr/bin/python3"]), &BTreeMap::new())
            .unwrap();

        let suffix = name.strip_prefix("work-python3-").unwrap();
        let suffix: u32 = suffix.parse().unwrap();
        assert!((1000..=9999).contains(&suffix));
        assert!(backend.has_session(&name));
        assert!(factory.registry().contains(&name));
    }

    #[test]
    fn test_incrementing_suffix_skips_refused_names() {
        let backend = Arc::new(FakeBackend::new());
        backend.reject_name("work-bash-1");
        let factory = SessionFactory::new(
            backend.clone(),
            Arc::new(NameRegistry::new()),
            &settings(5),
        )
        .with_strategy(SuffixStrategy::Incrementing { start: 1 });

        let name = factory
            .create_unique("work", &cmd(&["bash"]), &BTreeMap::new())
            .unwrap();
        assert_eq!(name, "work-bash-2");
        assert!(!factory.registry().contains("work-bash-1"));
    }

    #[test]
    fn test_reserved_name_costs_an_attempt() {
        let backend = Arc::new(FakeBackend::new());
        let registry = Arc::new(NameRegistry::new());
        registry.try_reserve("work-session-7");
        let factory = SessionFactory::new(backend.clone(), registry, &settings(5))
            .with_strategy(SuffixStrategy::Incrementing { start: 7 });

        let name = factory.create_unique("work", &[], &BTreeMap::new()).unwrap();
        assert_eq!(name, "work-session-8");
        assert_eq!(backend.create_calls(), 1);
    }

    #[test]
    fn test_exhaustion() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_creates(true);
        let registry = Arc::new(NameRegistry::new());
        let factory = SessionFactory::new(backend.clone(), registry.clone(), &settings(3));

        let err = factory
            .create_unique("work", &cmd(&["bash"]), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::CreationExhausted { attempts: 3 }));
        assert_eq!(backend.create_calls(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_env_reaches_backend() {
        let backend = Arc::new(FakeBackend::new());
        let factory = SessionFactory::new(
            backend.clone(),
            Arc::new(NameRegistry::new()),
            &SessionSettings::default(),
        );
        let mut env = BTreeMap::new();
        env.insert("RUST_LOG".to_string(), "debug".to_string());

        let name = factory.create_unique("work", &cmd(&["bash"]), &env).unwrap();
        assert_eq!(backend.session_env(&name), Some(env));
    }
}
