//! Error types for the tmux MCP server.

use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::snapshot::CaptureSnapshot;

/// Main error type for tmux MCP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No live session matches the reference
    #[error("{0}")]
    NotFound(String),

    /// More than one live session matches a prefix
    #[error("multiple sessions found with prefix '{prefix}': {}. Use specific session name", .candidates.join(", "))]
    Ambiguous {
        /// Prefix that was searched
        prefix: String,
        /// Every matching session name
        candidates: Vec<String>,
    },

    /// Session content changed since the caller's capture
    #[error("session state has changed. Expected hash {expected}, got {actual}. Please capture current output first and carefully consider whether the sent keys still make sense")]
    Mismatch {
        /// Fingerprint the caller presented
        expected: Fingerprint,
        /// Fingerprint of the fresh capture
        actual: Fingerprint,
    },

    /// Name-collision retries ran out
    #[error("failed to create unique session after {attempts} attempts")]
    CreationExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Overall deadline reached before the expected text appeared
    #[error("timeout waiting for '{expected}' on cursor line after {waited_ms}ms")]
    DeadlineExceeded {
        /// Text that was awaited
        expected: String,
        /// Time spent waiting
        waited_ms: u64,
        /// Last snapshot observed
        snapshot: Box<CaptureSnapshot>,
    },

    /// Output stopped changing before the expected text appeared
    #[error("no new output for {stalled_ms}ms while waiting for '{expected}' on cursor line")]
    StalledNoOutput {
        /// Text that was awaited
        expected: String,
        /// Stall threshold that fired
        stalled_ms: u64,
        /// Last snapshot observed
        snapshot: Box<CaptureSnapshot>,
    },

    /// Wait cancelled by the caller
    #[error("wait cancelled after {waited_ms}ms")]
    Cancelled {
        /// Time spent waiting
        waited_ms: u64,
        /// Last snapshot observed, if any capture succeeded
        snapshot: Option<Box<CaptureSnapshot>>,
    },

    /// A capture, send, create or destroy call to tmux failed
    #[error("tmux backend error: {0}")]
    BackendUnavailable(String),

    /// New session refused because the prefix is already in use
    #[error("session with prefix '{prefix}' already exists: {existing}. Use allow_multiple, or kill_others with kill_fingerprints")]
    SessionExists {
        /// Prefix that was requested
        prefix: String,
        /// First existing session with that prefix
        existing: String,
    },

    /// Invalid key string
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Snapshot carried by wait failures.
    pub fn snapshot(&self) -> Option<&CaptureSnapshot> {
        match self {
            Error::DeadlineExceeded { snapshot, .. } | Error::StalledNoOutput { snapshot, .. } => {
                Some(&**snapshot)
            }
            Error::Cancelled { snapshot, .. } => snapshot.as_deref(),
            _ => None,
        }
    }

    /// Whether the caller can fix the request (as opposed to tmux failing).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Ambiguous { .. }
                | Error::Mismatch { .. }
                | Error::SessionExists { .. }
                | Error::InvalidKey(_)
                | Error::InvalidInput(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = Error::NotFound("session 'work' not found".to_string());
        assert_eq!(err.to_string(), "session 'work' not found");
    }

    #[test]
    fn test_ambiguous_lists_candidates() {
        let err = Error::Ambiguous {
            prefix: "work".to_string(),
            candidates: vec!["work-bash-1".to_string(), "work-vim-2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "multiple sessions found with prefix 'work': work-bash-1, work-vim-2. Use specific session name"
        );
    }

    #[test]
    fn test_mismatch_reports_both_fingerprints() {
        let err = Error::Mismatch {
            expected: Fingerprint::from_token("aaaaaaaa"),
            actual: Fingerprint::from_token("bbbbbbbb"),
        };
        let display = err.to_string();
        assert!(display.contains("Expected hash aaaaaaaa, got bbbbbbbb"));
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_creation_exhausted_error() {
        let err = Error::CreationExhausted { attempts: 100 };
        assert_eq!(
            err.to_string(),
            "failed to create unique session after 100 attempts"
        );
    }

    #[test]
    fn test_wait_errors_carry_snapshot() {
        let snap = CaptureSnapshot::new("s", "$ ");
        let err = Error::StalledNoOutput {
            expected: "ready".to_string(),
            stalled_ms: 20000,
            snapshot: Box::new(snap.clone()),
        };
        assert_eq!(err.snapshot(), Some(&snap));
        assert!(err.to_string().contains("no new output for 20000ms"));

        let err = Error::Cancelled {
            waited_ms: 10,
            snapshot: None,
        };
        assert!(err.snapshot().is_none());
    }

    #[test]
    fn test_backend_error_is_not_caller_error() {
        let err = Error::BackendUnavailable("can't find session: x".to_string());
        assert!(!err.is_caller_error());
        assert_eq!(err.to_string(), "tmux backend error: can't find session: x");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "tmux not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("tmux not found"));
    }
}
