//! Listing live sessions and resolving session references.

use std::path::Path;
use std::process::Command;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use tmux_mcp_core::session::FALLBACK_PREFIX;
use tmux_mcp_core::{sanitize_prefix, Error, Result, SessionSelector};

use crate::backend::TerminalBackend;

/// Read-only view of the live sessions known to the backend.
pub struct SessionDirectory {
    backend: Arc<dyn TerminalBackend>,
    configured_prefix: Option<String>,
    detected_prefix: OnceLock<String>,
}

impl SessionDirectory {
    /// Directory over `backend`, using `default_prefix` when a reference
    /// names neither a session nor a prefix.
    pub fn new(backend: Arc<dyn TerminalBackend>, default_prefix: Option<String>) -> Self {
        Self {
            backend,
            configured_prefix: default_prefix.filter(|p| !p.is_empty()),
            detected_prefix: OnceLock::new(),
        }
    }

    /// Live session names, optionally filtered by prefix.
    ///
    /// A failed query (no tmux server running, typically) yields an empty list.
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        let sessions = match self.backend.list() {
            Ok(sessions) => sessions,
            Err(e) => {
                debug!("Listing sessions failed, treating as empty: {}", e);
                return Vec::new();
            }
        };

        match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => sessions
                .into_iter()
                .filter(|name| name.starts_with(prefix))
                .collect(),
            None => sessions,
        }
    }

    /// Resolve a reference to exactly one live session.
    pub fn resolve(&self, selector: &SessionSelector) -> Result<String> {
        if let Some(name) = selector.explicit_name() {
            return if self.list(None).iter().any(|s| s == name) {
                Ok(name.to_string())
            } else {
                Err(Error::NotFound(format!("session '{name}' not found")))
            };
        }

        let prefix = match selector.prefix() {
            Some(prefix) => prefix.to_string(),
            None => self.default_prefix(),
        };

        let mut matches = self.list(Some(&prefix));
        match matches.len() {
            0 => Err(Error::NotFound(format!(
                "no sessions found with prefix '{prefix}'"
            ))),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::Ambiguous {
                prefix,
                candidates: matches,
            }),
        }
    }

    /// Prefix used when the caller gives none.
    ///
    /// The configured prefix wins; otherwise the git repository of the
    /// working directory names it, falling back to `tmux`.
    pub fn default_prefix(&self) -> String {
        if let Some(prefix) = &self.configured_prefix {
            return prefix.clone();
        }
        self.detected_prefix.get_or_init(detect_prefix).clone()
    }
}

/// Derive a prefix from the enclosing git repository.
pub fn detect_prefix() -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            prefix_from_toplevel(String::from_utf8_lossy(&output.stdout).trim())
        }
        _ => FALLBACK_PREFIX.to_string(),
    }
}

/// Sanitized basename of a repository path.
pub fn prefix_from_toplevel(path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if name.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        sanitize_prefix(&name)
    }
}
