//! Session references and session-name derivation.

use lazy_static::lazy_static;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref PREFIX_UNSAFE: Regex = Regex::new(r"[^a-zA-Z0-9\-_]").unwrap();
    static ref TOKEN_UNSAFE: Regex = Regex::new(r"[^a-zA-Z0-9]").unwrap();
}

/// Token used when the command yields no usable characters.
pub const DEFAULT_COMMAND_TOKEN: &str = "session";

/// Maximum bytes of the command basename kept in a session name.
pub const COMMAND_TOKEN_MAX_LEN: usize = 10;

/// Prefix used when nothing better can be detected.
pub const FALLBACK_PREFIX: &str = "tmux";

/// How a caller refers to a session: an exact name, or a prefix that must
/// match exactly one live session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionSelector {
    /// Exact session name (takes precedence over `prefix`)
    #[serde(default)]
    pub session: Option<String>,
    /// Session name prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

impl SessionSelector {
    /// Select by exact name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            session: Some(name.into()),
            prefix: None,
        }
    }

    /// Select by prefix.
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            session: None,
            prefix: Some(prefix.into()),
        }
    }

    /// Exact name, ignoring empty strings.
    pub fn explicit_name(&self) -> Option<&str> {
        self.session.as_deref().filter(|s| !s.is_empty())
    }

    /// Prefix, ignoring empty strings.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|s| !s.is_empty())
    }
}

/// Make a string safe to use as a session prefix.
pub fn sanitize_prefix(raw: &str) -> String {
    PREFIX_UNSAFE.replace_all(raw, "-").into_owned()
}

/// Short token naming the program a session runs.
///
/// Takes the basename of the first command element, truncates it and strips
/// everything that is not ASCII alphanumeric.
pub fn command_token(command: &[String]) -> String {
    let Some(program) = command.first() else {
        return DEFAULT_COMMAND_TOKEN.to_string();
    };

    let base = program.rsplit('/').next().unwrap_or(program);
    let truncated: String = base
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= COMMAND_TOKEN_MAX_LEN)
        .map(|(_, c)| c)
        .collect();
    let token = TOKEN_UNSAFE.replace_all(&truncated, "").into_owned();

    if token.is_empty() {
        DEFAULT_COMMAND_TOKEN.to_string()
    } else {
        token
    }
}

/// `<prefix>-<command token>`, the part of a session name before its suffix.
pub fn base_name(prefix: &str, command: &[String]) -> String {
    format!("{prefix}-{}", command_token(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selector_ignores_empty_strings() {
        let selector = SessionSelector {
            session: Some(String::new()),
            prefix: Some(String::new()),
        };
        assert_eq!(selector.explicit_name(), None);
        assert_eq!(selector.prefix(), None);

        assert_eq!(SessionSelector::named("a").explicit_name(), Some("a"));
        assert_eq!(SessionSelector::prefixed("p").prefix(), Some("p"));
    }

    #[test]
    fn test_selector_deserializes_partial() {
        let selector: SessionSelector = serde_json::from_str(r#"{"prefix":"work"}"#).unwrap();
        assert_eq!(selector.prefix(), Some("work"));
        assert_eq!(selector.explicit_name(), None);
    }

    #[test]
    fn test_sanitize_prefix() {
        assert_eq!(sanitize_prefix("my repo.git"), "my-repo-git");
        assert_eq!(sanitize_prefix("ok_name-1"), "ok_name-1");
    }

    #[test]
    fn test_command_token() {
        assert_eq!(command_token(&cmd(&["bash"])), "bash");
        assert_eq!(command_token(&cmd(&["/usr/bin/python3", "-i"])), "python3");
        assert_eq!(command_token(&cmd(&["node-inspector-long"])), "nodeinspe");
        assert_eq!(command_token(&cmd(&["./--"])), "session");
        assert_eq!(command_token(&[]), "session");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("work", &cmd(&["bash"])), "work-bash");
        assert_eq!(base_name("work", &[]), "work-session");
    }
}
