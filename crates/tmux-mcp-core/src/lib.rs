//! # tmux-mcp-core
//!
//! Core types for the tmux MCP server.
//!
//! This crate contains the fundamental types with **no internal dependencies**
//! on other tmux-mcp crates. It provides:
//!
//! - Content fingerprints and capture snapshots
//! - Session selectors and session-name derivation
//! - Key payload validation for `send-keys`
//! - Server configuration
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - the session engine and the MCP
//! server both depend on it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod key;
pub mod session;
pub mod snapshot;

// Re-export commonly used types
pub use config::{ServerConfig, ServerSettings, SessionSettings, TmuxSettings, WaitSettings};
pub use error::{Error, Result};
pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_LEN};
pub use key::{parse_keys, validate_key, SendMode};
pub use session::{base_name, command_token, sanitize_prefix, SessionSelector};
pub use snapshot::{format_output, line_at, CaptureSnapshot};
