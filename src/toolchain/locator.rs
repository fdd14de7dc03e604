//! Toolchain Locator
//!
//! Probes candidate compilers in preference order and returns the first one
//! that answers a version query within the probe timeout.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ToolchainConfig;

/// Argument conventions a compiler follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainFlavor {
    /// gcc/clang style: `-o out`, `--version`
    Posix,
    /// MSVC `cl`: `/Fe:out`, no version flag
    Msvc,
}

impl ToolchainFlavor {
    /// Infer the flavor from a compiler name
    pub fn from_name(name: &str) -> Self {
        let stem = name.trim_end_matches(".exe").to_ascii_lowercase();
        if stem == "cl" {
            Self::Msvc
        } else {
            Self::Posix
        }
    }

    /// Arguments for a cheap invocation that proves the compiler runs
    fn probe_args(self) -> &'static [&'static str] {
        match self {
            Self::Posix => &["--version"],
            Self::Msvc => &["/?"],
        }
    }
}

/// A compiler that passed its probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Candidate name as configured
    pub name: String,
    /// Resolved executable path
    pub path: PathBuf,
    pub flavor: ToolchainFlavor,
}

/// Finds a usable compiler among configured candidates
#[derive(Debug, Clone)]
pub struct ToolchainLocator {
    candidates: Vec<String>,
    probe_timeout: Duration,
}

impl ToolchainLocator {
    pub fn new(candidates: Vec<String>, probe_timeout: Duration) -> Self {
        Self {
            candidates,
            probe_timeout,
        }
    }

    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self::new(config.candidates.clone(), config.probe_timeout())
    }

    /// Return the first candidate that resolves on PATH and answers its probe
    pub async fn locate(&self) -> Option<Toolchain> {
        for name in &self.candidates {
            let path = match which::which(name) {
                Ok(p) => p,
                Err(_) => {
                    debug!("Compiler candidate {} not on PATH", name);
                    continue;
                }
            };

            let flavor = ToolchainFlavor::from_name(name);
            if self.probe(&path, flavor).await {
                info!("Using compiler {} at {:?}", name, path);
                return Some(Toolchain {
                    name: name.clone(),
                    path,
                    flavor,
                });
            }
        }

        warn!("No compiler found among candidates {:?}", self.candidates);
        None
    }

    async fn probe(&self, path: &Path, flavor: ToolchainFlavor) -> bool {
        let child = Command::new(path)
            .args(flavor.probe_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                debug!("Probe of {:?} failed to spawn: {}", path, e);
                return false;
            }
        };

        match tokio::time::timeout(self.probe_timeout, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!("Probe of {:?} failed: {}", path, e);
                false
            }
            Err(_) => {
                warn!("Probe of {:?} timed out after {:?}", path, self.probe_timeout);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_from_name() {
        assert_eq!(ToolchainFlavor::from_name("g++"), ToolchainFlavor::Posix);
        assert_eq!(ToolchainFlavor::from_name("clang++"), ToolchainFlavor::Posix);
        assert_eq!(ToolchainFlavor::from_name("cl"), ToolchainFlavor::Msvc);
        assert_eq!(ToolchainFlavor::from_name("CL.exe"), ToolchainFlavor::Msvc);
    }

    #[tokio::test]
    async fn test_locate_missing_candidates() {
        let locator = ToolchainLocator::new(
            vec!["definitely-not-a-compiler-4c1e".to_string()],
            Duration::from_millis(500),
        );
        assert!(locator.locate().await.is_none());
    }

    #[tokio::test]
    async fn test_locate_empty_list() {
        let locator = ToolchainLocator::new(Vec::new(), Duration::from_millis(500));
        assert!(locator.locate().await.is_none());
    }
}
