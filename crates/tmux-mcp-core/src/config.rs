//! Configuration types for the tmux MCP server.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// tmux invocation settings
    pub tmux: TmuxSettings,
    /// Polling and timeout settings
    pub wait: WaitSettings,
    /// Session creation settings
    pub session: SessionSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.tmux.binary.trim().is_empty() {
            return Err(Error::Config("tmux.binary cannot be empty".to_string()));
        }

        self.wait.validate()?;

        if self.session.max_creation_attempts == 0 {
            return Err(Error::Config(
                "session.max_creation_attempts must be > 0".to_string(),
            ));
        }

        if self.session.suffix_min > self.session.suffix_max {
            return Err(Error::Config(format!(
                "session suffix range is empty ({}..={})",
                self.session.suffix_min, self.session.suffix_max
            )));
        }

        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Transport type (only stdio is served)
    pub transport: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// How tmux is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxSettings {
    /// tmux executable
    pub binary: String,
    /// Socket path passed as `-S` (None = tmux default server)
    pub socket: Option<String>,
    /// Prefix used when a call names neither a session nor a prefix
    pub default_prefix: Option<String>,
}

impl Default for TmuxSettings {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            socket: None,
            default_prefix: None,
        }
    }
}

/// Polling cadence and deadlines for the output waiters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    /// Delay between captures
    pub poll_interval_ms: u64,
    /// Output must stay unchanged this long to count as stable
    pub stability_threshold_ms: u64,
    /// Default deadline when waiting for stability
    pub stability_timeout_ms: u64,
    /// Default deadline when waiting for expected text
    pub expect_timeout_ms: u64,
    /// Give up on expected text after this long without any output change
    pub no_output_timeout_ms: u64,
    /// Consecutive failed captures tolerated before the wait fails
    pub max_consecutive_capture_failures: u32,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            stability_threshold_ms: 500,
            stability_timeout_ms: 10_000,
            expect_timeout_ms: 60_000,
            no_output_timeout_ms: 20_000,
            max_consecutive_capture_failures: 10,
        }
    }
}

impl WaitSettings {
    /// Delay between captures.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Debounce window for stability.
    pub fn stability_threshold(&self) -> Duration {
        Duration::from_millis(self.stability_threshold_ms)
    }

    /// Default stability deadline.
    pub fn stability_timeout(&self) -> Duration {
        Duration::from_millis(self.stability_timeout_ms)
    }

    /// Default expectation deadline.
    pub fn expect_timeout(&self) -> Duration {
        Duration::from_millis(self.expect_timeout_ms)
    }

    /// Stall threshold for expectation waits.
    pub fn no_output_timeout(&self) -> Duration {
        Duration::from_millis(self.no_output_timeout_ms)
    }

    /// Validate wait settings.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("wait.poll_interval_ms must be > 0".to_string()));
        }
        if self.stability_threshold_ms >= self.stability_timeout_ms {
            return Err(Error::Config(
                "wait.stability_threshold_ms must be shorter than wait.stability_timeout_ms"
                    .to_string(),
            ));
        }
        if self.no_output_timeout_ms >= self.expect_timeout_ms {
            return Err(Error::Config(
                "wait.no_output_timeout_ms must be shorter than wait.expect_timeout_ms"
                    .to_string(),
            ));
        }
        if self.max_consecutive_capture_failures == 0 {
            return Err(Error::Config(
                "wait.max_consecutive_capture_failures must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Session creation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Name-collision retries before giving up
    pub max_creation_attempts: u32,
    /// Smallest random suffix
    pub suffix_min: u32,
    /// Largest random suffix
    pub suffix_max: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_creation_attempts: 100,
            suffix_min: 1000,
            suffix_max: 9999,
        }
    }
}
