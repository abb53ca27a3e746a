//! # tmux-mcp-session
//!
//! Safety-gated session engine for the tmux MCP server.
//!
//! This crate provides:
//! - A [`TerminalBackend`] seam with a tmux implementation
//! - Session resolution and unique session creation
//! - The fingerprint [`SafetyGate`] in front of every mutating action
//! - Quiescence and expectation waiters over an injectable [`Clock`]
//! - The [`SessionManager`] executing capture, send, create and kill
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on tmux-mcp-core and is
//! driven by the MCP server. Every operation is blocking; async callers run
//! them on a blocking thread pool.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod clock;
pub mod directory;
pub mod factory;
pub mod gate;
pub mod manager;
pub mod testing;
pub mod wait;

// Re-export commonly used types
pub use backend::{CursorCapture, TerminalBackend, TmuxBackend};
pub use clock::{Clock, SystemClock};
pub use directory::{detect_prefix, SessionDirectory};
pub use factory::{NameRegistry, SessionFactory, SuffixStrategy};
pub use gate::SafetyGate;
pub use manager::{NewSessionRequest, SendKeysRequest, SessionManager};
pub use wait::{ExpectationWaiter, QuiescenceWaiter, WaitKind, WaitOutcome};
