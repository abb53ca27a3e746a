//! Key payloads for `tmux send-keys`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How tmux interprets a key payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// tmux key names: literals, `C-`/`M-`/`S-` modifiers, named keys
    Keys,
    /// `-l`: UTF-8 text with no key-name lookup
    Literal,
    /// `-H`: space-separated hexadecimal byte values
    Hex,
}

impl SendMode {
    /// The `send-keys` flag for this mode.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            SendMode::Keys => None,
            SendMode::Literal => Some("-l"),
            SendMode::Hex => Some("-H"),
        }
    }
}

fn is_modifier(segment: &str) -> bool {
    matches!(segment, "C" | "^" | "M" | "S")
}

/// Validate one whitespace-separated key in [`SendMode::Keys`] mode.
///
/// A word is a modifier chain (`C-c`, `C-M-x`, `^-a`) when every segment
/// before the last `-` is a modifier; the chain must then end in a key.
/// Any other word, including plain text like `my-dir`, is left for tmux,
/// which sends unknown key names as literal text.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("empty key".to_string()));
    }

    let segments: Vec<&str> = key.split('-').collect();
    if let Some((last, modifiers)) = segments.split_last() {
        let is_chain = !modifiers.is_empty() && modifiers.iter().all(|m| is_modifier(m));
        if is_chain && last.is_empty() {
            return Err(Error::InvalidKey(format!(
                "invalid key '{key}': missing key after modifier"
            )));
        }
    }

    Ok(())
}

/// Validate a payload and split it into `send-keys` arguments.
///
/// Literal payloads are passed through as one argument. Key and hex payloads
/// are split on whitespace and each word is validated.
pub fn parse_keys(keys: &str, mode: SendMode) -> Result<Vec<String>> {
    if keys.is_empty() {
        return Err(Error::InvalidKey("keys cannot be empty".to_string()));
    }

    match mode {
        SendMode::Literal => Ok(vec![keys.to_string()]),
        SendMode::Hex | SendMode::Keys => {
            let parts: Vec<String> = keys.split_whitespace().map(str::to_string).collect();
            if parts.is_empty() {
                return Err(Error::InvalidKey("keys cannot be blank".to_string()));
            }
            for part in &parts {
                if mode == SendMode::Hex {
                    u8::from_str_radix(part, 16).map_err(|e| {
                        Error::InvalidKey(format!("invalid hex value '{part}': {e}"))
                    })?;
                } else {
                    validate_key(part)?;
                }
            }
            Ok(parts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_mode_flags() {
        assert_eq!(SendMode::Keys.flag(), None);
        assert_eq!(SendMode::Literal.flag(), Some("-l"));
        assert_eq!(SendMode::Hex.flag(), Some("-H"));
    }

    #[test]
    fn test_parse_control_keys_splits_on_whitespace() {
        let parts = parse_keys("C-c Enter Up Down", SendMode::Keys).unwrap();
        assert_eq!(parts, vec!["C-c", "Enter", "Up", "Down"]);
    }

    #[test]
    fn test_parse_literal_is_single_argument() {
        let parts = parse_keys("hello world with spaces", SendMode::Literal).unwrap();
        assert_eq!(parts, vec!["hello world with spaces"]);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_keys("1b 5b 41", SendMode::Hex).unwrap(), vec!["1b", "5b", "41"]);
        assert!(parse_keys("zz", SendMode::Hex).is_err());
        assert!(parse_keys("1ff", SendMode::Hex).is_err());
    }

    #[test]
    fn test_modifier_chains() {
        assert!(validate_key("C-c").is_ok());
        assert!(validate_key("M-x").is_ok());
        assert!(validate_key("^-a").is_ok());
        assert!(validate_key("C-M-x").is_ok());
        assert!(validate_key("C-").is_err());
        assert!(validate_key("C-M-").is_err());
    }

    #[test]
    fn test_hyphenated_words_pass_through() {
        assert!(validate_key("my-dir").is_ok());
        assert!(validate_key("X-c").is_ok());
        assert!(validate_key("-").is_ok());
        assert!(validate_key("C--").is_ok());

        let parts = parse_keys("cd my-dir Enter", SendMode::Keys).unwrap();
        assert_eq!(parts, vec!["cd", "my-dir", "Enter"]);
    }

    #[test]
    fn test_empty_payloads_rejected() {
        assert!(matches!(parse_keys("", SendMode::Keys), Err(Error::InvalidKey(_))));
        assert!(matches!(parse_keys("   ", SendMode::Keys), Err(Error::InvalidKey(_))));
        assert!(parse_keys("", SendMode::Literal).is_err());
    }
}
