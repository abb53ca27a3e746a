//! tmux MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router] pattern.
//! Each tool call runs its session operation on the blocking thread pool.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use tmux_mcp_core::{Error, Fingerprint, SendMode, ServerConfig};
use tmux_mcp_session::{NewSessionRequest, SendKeysRequest, SessionManager};

use crate::tools::{
    max_wait_duration, ActionResponse, CaptureParams, CaptureResponse, KillParams, KillResponse,
    ListParams, ListResponse, NewSessionParams, SendControlKeysParams, SendKeysParams,
};

/// Map an engine error onto an MCP error.
///
/// Wait failures append the last captured output so the caller can see
/// what the session showed when the wait gave up.
pub fn to_mcp_error(err: Error) -> McpError {
    let code = if err.is_caller_error() {
        ErrorCode(-32602) // Invalid params
    } else {
        ErrorCode(-32603) // Internal error
    };

    match err.snapshot() {
        Some(snapshot) => {
            let data = serde_json::json!({
                "session": snapshot.session_name,
                "fingerprint": snapshot.fingerprint,
            });
            let message = format!(
                "{err}\nfingerprint: {}\n\n{}",
                snapshot.fingerprint, snapshot.formatted_text
            );
            McpError::new(code, message, Some(data))
        }
        None => McpError::new(code, err.to_string(), None),
    }
}

fn invalid_params(message: String) -> McpError {
    McpError::new(ErrorCode(-32602), message, None)
}

fn json_result<T: Serialize>(response: &T, fallback: impl FnOnce() -> String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(response).unwrap_or_else(|_| fallback()),
    )])
}

/// tmux MCP Server
///
/// Exposes fingerprint-gated tmux session tools over MCP.
#[derive(Clone)]
pub struct TmuxMcpServer {
    /// Session engine shared by every tool call
    manager: Arc<SessionManager>,
    /// Cancelled on shutdown; every in-flight wait observes it
    shutdown: CancellationToken,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TmuxMcpServer {
    /// Create a server driving the tmux binary described by `config`
    pub fn new(config: ServerConfig) -> Self {
        Self::with_manager(Arc::new(SessionManager::new(config)))
    }

    /// Create a server over an existing session manager
    pub fn with_manager(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            shutdown: CancellationToken::new(),
            tool_router: Self::tool_router(),
        }
    }

    /// Token cancelled when the server shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run a session operation on the blocking pool.
    ///
    /// The operation gets a token that is cancelled on shutdown or when the
    /// calling future is dropped, which is how rmcp abandons a cancelled request.
    async fn run_blocking<T, F>(&self, operation: F) -> Result<T, McpError>
    where
        T: Send + 'static,
        F: FnOnce(&SessionManager, &CancellationToken) -> tmux_mcp_core::Result<T>
            + Send
            + 'static,
    {
        let manager = self.manager.clone();
        let cancel = self.shutdown.child_token();
        let _guard = cancel.clone().drop_guard();

        tokio::task::spawn_blocking(move || operation(&manager, &cancel))
            .await
            .map_err(|e| {
                error!("Session task failed: {}", e);
                McpError::new(
                    ErrorCode(-32603),
                    format!("Session task failed: {e}"),
                    None,
                )
            })?
            .map_err(|e| {
                if e.is_caller_error() {
                    warn!("Rejected request: {}", e);
                } else {
                    error!("Session operation failed: {}", e);
                }
                to_mcp_error(e)
            })
    }

    /// Capture a session's current output
    #[tool(
        description = "Capture the current output of a tmux session. Returns numbered lines and the fingerprint required by every mutating tool."
    )]
    #[instrument(skip_all)]
    pub async fn tmux_capture(
        &self,
        Parameters(params): Parameters<CaptureParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Capturing session: session={:?}, prefix={:?}",
            params.session, params.prefix
        );

        let selector = params.selector();
        let snapshot = self
            .run_blocking(move |manager, _| manager.capture(&selector))
            .await?;

        info!(
            "Captured {} (fingerprint {})",
            snapshot.session_name, snapshot.fingerprint
        );

        let response = CaptureResponse::from(snapshot);
        Ok(json_result(&response, || response.output.clone()))
    }

    /// List live sessions
    #[tool(description = "List live tmux sessions, optionally filtered by name prefix")]
    #[instrument(skip_all)]
    pub async fn tmux_list(
        &self,
        Parameters(params): Parameters<ListParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Listing sessions: prefix={:?}", params.prefix);

        let prefix = params.prefix;
        let sessions = self
            .run_blocking(move |manager, _| Ok(manager.list(prefix.as_deref())))
            .await?;

        let count = sessions.len();
        info!("Found {} session(s)", count);

        let response = ListResponse { sessions, count };
        Ok(json_result(&response, || format!("{count} sessions")))
    }

    /// Create a session under a unique name
    #[tool(
        description = "Start a new tmux session running a command, then wait for its output to settle (or for `expect` to appear on the cursor line). Refuses if a session with the same prefix exists unless allow_multiple or kill_others is set. kill_others needs kill_fingerprints: the latest fingerprint of every session it will destroy, keyed by session name."
    )]
    #[instrument(skip_all)]
    pub async fn tmux_new_session(
        &self,
        Parameters(params): Parameters<NewSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Creating session: command={:?}, prefix={:?}, kill_others={}, allow_multiple={}",
            params.command, params.prefix, params.kill_others, params.allow_multiple
        );

        let request = NewSessionRequest {
            command: params.command,
            prefix: params.prefix,
            env: params.env,
            expect: params.expect,
            max_wait: max_wait_duration(params.max_wait).map_err(invalid_params)?,
            kill_others: params.kill_others,
            kill_fingerprints: params
                .kill_fingerprints
                .into_iter()
                .map(|(session, token)| (session, Fingerprint::from_token(token)))
                .collect(),
            allow_multiple: params.allow_multiple,
        };

        let outcome = self
            .run_blocking(move |manager, cancel| manager.new_session(&request, cancel))
            .await?;

        info!(
            "Session {} ready after {:?} ({:?})",
            outcome.snapshot.session_name, outcome.waited, outcome.kind
        );

        let message = format!("Session '{}' created", outcome.snapshot.session_name);
        let response = ActionResponse::new(outcome, message);
        Ok(json_result(&response, || response.message.clone()))
    }

    /// Type literal text into a session
    #[tool(
        description = "Type literal text into a tmux session, optionally followed by Enter, then wait for output to settle (or for `expect` to appear on the cursor line). Requires the fingerprint from your latest capture; fails if the session output changed since."
    )]
    #[instrument(skip_all)]
    pub async fn tmux_send_keys(
        &self,
        Parameters(params): Parameters<SendKeysParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Sending keys: session={:?}, prefix={:?}, length={} chars, enter={}",
            params.session,
            params.prefix,
            params.keys.chars().count(),
            params.enter
        );

        let request = SendKeysRequest {
            target: params.selector(),
            fingerprint: Fingerprint::from_token(params.fingerprint),
            keys: params.keys,
            mode: SendMode::Literal,
            enter: params.enter,
            expect: params.expect,
            max_wait: max_wait_duration(params.max_wait).map_err(invalid_params)?,
        };

        self.send(request).await
    }

    /// Send tmux key names or hex bytes to a session
    #[tool(
        description = "Send control keys to a tmux session: whitespace-separated tmux key names (C-c, M-x, S-Tab, Escape, Enter, Up, F1, ...) or, with hex=true, raw hex bytes. Requires the fingerprint from your latest capture."
    )]
    #[instrument(skip_all)]
    pub async fn tmux_send_control_keys(
        &self,
        Parameters(params): Parameters<SendControlKeysParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Sending control keys: session={:?}, prefix={:?}, keys='{}', hex={}",
            params.session, params.prefix, params.keys, params.hex
        );

        let request = SendKeysRequest {
            target: params.selector(),
            fingerprint: Fingerprint::from_token(params.fingerprint),
            keys: params.keys,
            mode: if params.hex {
                SendMode::Hex
            } else {
                SendMode::Keys
            },
            enter: false,
            expect: params.expect,
            max_wait: max_wait_duration(params.max_wait).map_err(invalid_params)?,
        };

        self.send(request).await
    }

    async fn send(&self, request: SendKeysRequest) -> Result<CallToolResult, McpError> {
        let outcome = self
            .run_blocking(move |manager, cancel| manager.send_keys(&request, cancel))
            .await?;

        info!(
            "Input delivered to {} after {:?} ({:?})",
            outcome.snapshot.session_name, outcome.waited, outcome.kind
        );

        let message = format!("Sent to '{}'", outcome.snapshot.session_name);
        let response = ActionResponse::new(outcome, message);
        Ok(json_result(&response, || response.message.clone()))
    }

    /// Destroy a session
    #[tool(
        description = "Kill a tmux session. Requires the fingerprint from your latest capture; fails if the session output changed since."
    )]
    #[instrument(skip_all)]
    pub async fn tmux_kill(
        &self,
        Parameters(params): Parameters<KillParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Killing session: session={:?}, prefix={:?}",
            params.session, params.prefix
        );

        let selector = params.selector();
        let fingerprint = Fingerprint::from_token(params.fingerprint);
        let session = self
            .run_blocking(move |manager, _| manager.kill(&selector, &fingerprint))
            .await?;

        let response = KillResponse {
            message: format!("Session '{session}' killed"),
            session,
        };
        Ok(json_result(&response, || response.message.clone()))
    }
}

// Implement the ServerHandler trait to define server capabilities
#[tool_handler]
impl rmcp::ServerHandler for TmuxMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "tmux MCP Server - Drive tmux sessions safely. \
                 Call tmux_capture first: it returns the session output and a fingerprint. \
                 Every mutating tool (tmux_send_keys, tmux_send_control_keys, tmux_kill) requires \
                 that fingerprint and refuses to act if the output changed since you looked. \
                 Mutating tools return the next fingerprint. \
                 Use tmux_new_session to start a program and tmux_list to find sessions."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmux_mcp_core::CaptureSnapshot;

    #[test]
    fn test_caller_errors_are_invalid_params() {
        let err = to_mcp_error(Error::NotFound("session 'x' not found".to_string()));
        assert_eq!(err.code, ErrorCode(-32602));
        assert!(err.message.contains("not found"));
    }

    #[test]
    fn test_backend_errors_are_internal() {
        let err = to_mcp_error(Error::BackendUnavailable("no server running".to_string()));
        assert_eq!(err.code, ErrorCode(-32603));
    }

    #[test]
    fn test_wait_errors_carry_snapshot_text() {
        let snapshot = CaptureSnapshot::new("proj-make-1234", "building...\n");
        let fingerprint = snapshot.fingerprint.clone();
        let err = to_mcp_error(Error::DeadlineExceeded {
            expected: "done".to_string(),
            waited_ms: 60000,
            snapshot: Box::new(snapshot),
        });

        assert_eq!(err.code, ErrorCode(-32603));
        assert!(err.message.contains("[1]: building..."));
        assert!(err.message.contains(fingerprint.as_str()));
        assert!(err.data.is_some());
    }
}
