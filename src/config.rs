//! Runner Configuration
//!
//! Tunables for the toolchain probe, build, engine timers and session limits.
//! Loaded from an optional TOML file; every field has a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub server: ServerConfig,
    pub toolchain: ToolchainConfig,
    pub build: BuildConfig,
    pub engine: EngineConfig,
    pub sessions: SessionsConfig,
    pub workspace: WorkspaceConfig,
}

impl RunnerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP gateway binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler names in preference order
    pub candidates: Vec<String>,
    /// Upper bound on a single version probe
    pub probe_timeout_ms: u64,
}

impl ToolchainConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        let candidates: &[&str] = if cfg!(windows) {
            &["g++", "clang++", "cl"]
        } else {
            &["g++", "clang++", "c++"]
        };
        Self {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            probe_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Extra flags passed to POSIX-style compilers before the entry file
    pub extra_flags: Vec<String>,
    /// Kill the compiler after this many seconds. Unset means no limit.
    pub timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            extra_flags: vec!["-std=c++17".to_string()],
            timeout_secs: None,
        }
    }
}

/// Execution engine tunables.
///
/// `quiet_ms` and `startup_ms` drive the input-wait heuristic. Shorter values
/// raise the rate of premature `stdin_request` events for programs that
/// compute silently; longer values delay the prompt for programs that really
/// are blocked on a read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub quiet_ms: u64,
    pub startup_ms: u64,
    /// How long to keep reading pipes after the process exits
    pub exit_drain_ms: u64,
    /// Kill the program after this many seconds. Unset means no limit.
    pub max_run_secs: Option<u64>,
    pub kill_on_disconnect: bool,
    /// Capacity of the per-session event channel
    pub event_buffer: usize,
}

impl EngineConfig {
    pub fn quiet_delay(&self) -> Duration {
        Duration::from_millis(self.quiet_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }

    pub fn exit_drain(&self) -> Duration {
        Duration::from_millis(self.exit_drain_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiet_ms: 200,
            startup_ms: 300,
            exit_drain_ms: 500,
            max_run_secs: None,
            kill_on_disconnect: true,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub max_sessions: usize,
    /// How long a finished session id is remembered
    pub finished_retention_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 32,
            finished_retention_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory under which per-session workspaces are created
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            root: base.join("code-runner").join("workspaces"),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {0:?}: {1}")]
    Read(PathBuf, String),

    #[error("Invalid config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.engine.quiet_ms, 200);
        assert_eq!(config.engine.startup_ms, 300);
        assert!(config.engine.kill_on_disconnect);
        assert!(config.engine.max_run_secs.is_none());
        assert!(config.toolchain.candidates.iter().any(|c| c == "g++"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RunnerConfig::from_toml(
            r#"
            [engine]
            quiet_ms = 50
            max_run_secs = 10

            [toolchain]
            candidates = ["clang++"]
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.quiet_ms, 50);
        assert_eq!(config.engine.startup_ms, 300);
        assert_eq!(config.engine.max_run_secs, Some(10));
        assert_eq!(config.toolchain.candidates, vec!["clang++".to_string()]);
        assert_eq!(config.toolchain.probe_timeout_ms, 5000);
        assert_eq!(config.server.bind, "127.0.0.1:8787");
    }

    #[test]
    fn test_invalid_toml() {
        let result = RunnerConfig::from_toml("engine = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
