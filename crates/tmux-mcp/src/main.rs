//! # tmux MCP Server
//!
//! Model Context Protocol server that lets AI agents drive tmux sessions
//! without acting on output they have not seen.
//!
//! ## Overview
//!
//! This server provides MCP tools for:
//! - Session management (new, list, kill)
//! - Output capture with a content fingerprint
//! - Input (literal text, tmux key names, hex bytes), gated on that fingerprint
//! - Waiting for output to settle or for expected text
//!
//! ## Architecture
//!
//! This is Layer 2 - the MCP server binary that ties together:
//! - tmux-mcp-core: Core types and configuration
//! - tmux-mcp-session: Session engine
//!
//! ## Usage
//!
//! ```text
//! tmux-mcp [--config <path>]
//! ```
//!
//! Without `--config`, the `TMUX_MCP_CONFIG` environment variable is read;
//! absent both, defaults apply. `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use rmcp::{transport::stdio, ServiceExt};
use tmux_mcp::TmuxMcpServer;
use tmux_mcp_core::ServerConfig;

/// Environment variable naming a config file
const CONFIG_ENV: &str = "TMUX_MCP_CONFIG";

fn config_path(args: &[String]) -> anyhow::Result<Option<String>> {
    if let Some(pos) = args.iter().position(|arg| arg == "--config") {
        let path = args
            .get(pos + 1)
            .context("--config requires a path argument")?;
        return Ok(Some(path.clone()));
    }
    Ok(std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let config = match config_path(&args)? {
        Some(path) => ServerConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => ServerConfig::default(),
    };

    // Initialize logging; stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!(
        "tmux MCP Server v{} starting (tmux binary: {}, socket: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.tmux.binary,
        config.tmux.socket
    );

    if config.server.transport != "stdio" {
        anyhow::bail!(
            "unsupported transport '{}': only stdio is available",
            config.server.transport
        );
    }

    let server = TmuxMcpServer::new(config);
    let shutdown = server.shutdown_token();

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("tmux MCP Server running on stdio");

    // Wait for the service to complete
    let result = service.waiting().await;
    shutdown.cancel();
    result?;

    tracing::info!("tmux MCP Server shutting down");

    Ok(())
}
