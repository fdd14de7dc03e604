//! Build Stage
//!
//! Compiles the entry file of a workspace with a located toolchain.

use log::{debug, info};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use super::locator::{Toolchain, ToolchainFlavor};
use crate::config::BuildConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::workspace::Workspace;

/// Name of the produced binary inside the workspace
pub fn binary_name() -> &'static str {
    if cfg!(windows) {
        "program.exe"
    } else {
        "program"
    }
}

/// Result of a compiler run
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Success { binary: PathBuf },
    Failure { diagnostics: String },
}

/// Compiler invocation for one workspace
#[derive(Debug, Clone)]
pub struct BuildStage {
    extra_flags: Vec<String>,
    timeout: Option<Duration>,
}

impl BuildStage {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            extra_flags: config.extra_flags.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Arguments for compiling `entry` into `output`
    pub fn build_args(&self, flavor: ToolchainFlavor, entry: &str, output: &str) -> Vec<String> {
        match flavor {
            ToolchainFlavor::Posix => {
                let mut args = self.extra_flags.clone();
                args.push(entry.to_string());
                args.push("-o".to_string());
                args.push(output.to_string());
                args
            }
            ToolchainFlavor::Msvc => vec![
                "/nologo".to_string(),
                "/EHsc".to_string(),
                entry.to_string(),
                format!("/Fe:{}", output),
            ],
        }
    }

    /// Run the compiler to completion inside the workspace.
    ///
    /// A non-zero exit is a failure whatever the diagnostics say.
    pub async fn compile(
        &self,
        toolchain: &Toolchain,
        workspace: &Workspace,
        entry: &str,
    ) -> RunnerResult<BuildOutcome> {
        let output_name = binary_name();
        let args = self.build_args(toolchain.flavor, entry, output_name);
        debug!("Compiling with {:?} {:?}", toolchain.path, args);

        let start = Instant::now();
        let child = Command::new(&toolchain.path)
            .args(&args)
            .current_dir(workspace.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::SpawnFailed(format!("{}: {}", toolchain.name, e)))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::CompilationTimeout(limit.as_secs()))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| RunnerError::Runtime(format!("compiler failed: {}", e)))?;

        info!(
            "Compilation for session {} finished in {}ms (status {})",
            workspace.session_id(),
            start.elapsed().as_millis(),
            output.status
        );

        if output.status.success() {
            return Ok(BuildOutcome::Success {
                binary: workspace.file_path(output_name),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let diagnostics = if !stderr.trim().is_empty() {
            stderr
        } else if !stdout.trim().is_empty() {
            // cl writes its diagnostics to stdout
            stdout
        } else {
            format!(
                "compiler exited with code {}",
                output.status.code().unwrap_or(-1)
            )
        };

        Ok(BuildOutcome::Failure { diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolchainConfig;
    use crate::toolchain::ToolchainLocator;
    use crate::workspace::{SourceFile, WorkspaceManager};

    #[test]
    fn test_posix_args() {
        let stage = BuildStage::new(&BuildConfig::default());
        let args = stage.build_args(ToolchainFlavor::Posix, "main.cpp", "program");
        assert_eq!(args, vec!["-std=c++17", "main.cpp", "-o", "program"]);
    }

    #[test]
    fn test_msvc_args() {
        let stage = BuildStage::new(&BuildConfig::default());
        let args = stage.build_args(ToolchainFlavor::Msvc, "main.cpp", "program.exe");
        assert_eq!(args, vec!["/nologo", "/EHsc", "main.cpp", "/Fe:program.exe"]);
    }

    #[tokio::test]
    async fn test_compile_success_and_failure() {
        let Some(toolchain) = ToolchainLocator::from_config(&ToolchainConfig::default())
            .locate()
            .await
        else {
            eprintln!("no compiler on host, skipping");
            return;
        };

        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let stage = BuildStage::new(&BuildConfig::default());

        let ws = manager.create("ok").await.unwrap();
        let mut ws = manager
            .materialize(ws, &[SourceFile::new("main.cpp", "int main() { return 0; }\n")])
            .await
            .unwrap();
        let outcome = stage.compile(&toolchain, &ws, "main.cpp").await.unwrap();
        match outcome {
            BuildOutcome::Success { binary } => assert!(binary.exists()),
            BuildOutcome::Failure { diagnostics } => panic!("build failed: {}", diagnostics),
        }
        ws.destroy().await;

        let ws = manager.create("bad").await.unwrap();
        let mut ws = manager
            .materialize(ws, &[SourceFile::new("main.cpp", "int main( { return 0 }\n")])
            .await
            .unwrap();
        let outcome = stage.compile(&toolchain, &ws, "main.cpp").await.unwrap();
        match outcome {
            BuildOutcome::Failure { diagnostics } => assert!(!diagnostics.trim().is_empty()),
            BuildOutcome::Success { .. } => panic!("syntax error compiled"),
        }
        ws.destroy().await;
    }
}
