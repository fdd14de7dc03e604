//! Workspace Manager
//!
//! Creates `session-<id>` directories under a configured root, writes source
//! files into them and tears them down exactly once.

use log::{debug, info, warn};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;

use super::files::SourceFile;
use crate::error::{RunnerError, RunnerResult};

/// Lifetime counters shared by every workspace a manager hands out
#[derive(Debug, Default)]
struct WorkspaceCounters {
    created: AtomicU64,
    destroyed: AtomicU64,
}

/// Snapshot of workspace counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkspaceStats {
    pub created: u64,
    pub destroyed: u64,
}

/// Allocates per-session workspaces
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    counters: Arc<WorkspaceCounters>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counters: Arc::new(WorkspaceCounters::default()),
        }
    }

    pub fn stats(&self) -> WorkspaceStats {
        WorkspaceStats {
            created: self.counters.created.load(Ordering::SeqCst),
            destroyed: self.counters.destroyed.load(Ordering::SeqCst),
        }
    }

    /// Allocate a fresh directory for `session_id`
    pub async fn create(&self, session_id: &str) -> RunnerResult<Workspace> {
        let dir = self.root.join(format!("session-{}", session_id));

        fs::create_dir_all(&self.root).await.map_err(|e| {
            RunnerError::Workspace(format!("failed to create root {}: {}", self.root.display(), e))
        })?;
        // create_dir (not _all) so an existing directory is never silently shared
        fs::create_dir(&dir).await.map_err(|e| {
            RunnerError::Workspace(format!("failed to create {}: {}", dir.display(), e))
        })?;
        // the binary is spawned with this as cwd, so its path must not be relative
        let dir = fs::canonicalize(&dir).await.unwrap_or(dir);

        self.counters.created.fetch_add(1, Ordering::SeqCst);
        debug!("Created workspace {}", dir.display());

        Ok(Workspace {
            session_id: session_id.to_string(),
            dir,
            files: Vec::new(),
            binary: None,
            destroyed: false,
            counters: self.counters.clone(),
        })
    }

    /// Write every file into the workspace, all or nothing.
    ///
    /// On any failure the workspace is destroyed before the error returns.
    pub async fn materialize(
        &self,
        mut workspace: Workspace,
        files: &[SourceFile],
    ) -> RunnerResult<Workspace> {
        for file in files {
            let path = workspace.dir.join(&file.name);
            if let Err(e) = fs::write(&path, file.content.as_bytes()).await {
                let err = RunnerError::Workspace(format!("failed to write {}: {}", file.name, e));
                workspace.destroy().await;
                return Err(err);
            }
            workspace.files.push(path);
        }

        debug!(
            "Materialized {} file(s) into {}",
            files.len(),
            workspace.dir.display()
        );
        Ok(workspace)
    }
}

/// A directory exclusively owned by one session.
///
/// `destroy` is the normal release path. Dropping an undestroyed workspace
/// removes it synchronously, so an early return can never leak a directory.
#[derive(Debug)]
pub struct Workspace {
    session_id: String,
    dir: PathBuf,
    files: Vec<PathBuf>,
    binary: Option<PathBuf>,
    destroyed: bool,
    counters: Arc<WorkspaceCounters>,
}

impl Workspace {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Record the path of the binary produced by the build
    pub fn set_binary(&mut self, path: PathBuf) {
        self.binary = Some(path);
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Remove the binary, the sources and the directory.
    ///
    /// Missing entries count as removed. Calling this again is a no-op.
    pub async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(binary) = self.binary.take() {
            remove_file_tolerant(&binary).await;
        }
        for file in self.files.drain(..) {
            remove_file_tolerant(&file).await;
        }
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.dir.display(), e),
        }

        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        info!("Destroyed workspace for session {}", self.session_id);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        warn!(
            "Workspace for session {} dropped without destroy, removing",
            self.session_id
        );
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.dir.display(), e);
            }
        }
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

async fn remove_file_tolerant(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_materialize_destroy() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());

        let ws = manager.create("abc").await.unwrap();
        assert!(ws.dir().ends_with("session-abc"));
        assert!(ws.dir().is_dir());

        let files = vec![
            SourceFile::new("main.cpp", "int main(){return 0;}"),
            SourceFile::new("data.txt", "1 2 3"),
        ];
        let mut ws = manager.materialize(ws, &files).await.unwrap();
        let written = std::fs::read_to_string(ws.file_path("data.txt")).unwrap();
        assert_eq!(written, "1 2 3");

        let dir = ws.dir().to_path_buf();
        ws.destroy().await;
        assert!(!dir.exists());
        assert_eq!(manager.stats(), WorkspaceStats { created: 1, destroyed: 1 });

        // second destroy and the drop that follows are both no-ops
        ws.destroy().await;
        drop(ws);
        assert_eq!(manager.stats().destroyed, 1);
    }

    #[tokio::test]
    async fn test_destroy_tolerates_missing_entries() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let ws = manager.create("gone").await.unwrap();
        let mut ws = manager
            .materialize(ws, &[SourceFile::new("main.cpp", "")])
            .await
            .unwrap();
        ws.set_binary(ws.file_path("program"));

        std::fs::remove_dir_all(ws.dir()).unwrap();
        ws.destroy().await;
        assert!(ws.is_destroyed());
        assert_eq!(manager.stats().destroyed, 1);
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let ws = manager.create("dropped").await.unwrap();
        let dir = ws.dir().to_path_buf();

        drop(ws);
        assert!(!dir.exists());
        assert_eq!(manager.stats().destroyed, 1);
    }

    #[tokio::test]
    async fn test_materialize_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let ws = manager.create("partial").await.unwrap();
        let dir = ws.dir().to_path_buf();

        // a directory occupying the target name makes the write fail
        std::fs::create_dir(dir.join("b.cpp")).unwrap();
        let files = vec![SourceFile::new("a.cpp", "ok"), SourceFile::new("b.cpp", "boom")];

        let result = manager.materialize(ws, &files).await;
        assert!(matches!(result, Err(RunnerError::Workspace(_))));
        assert!(!dir.exists());
        assert_eq!(manager.stats(), WorkspaceStats { created: 1, destroyed: 1 });
    }

    #[tokio::test]
    async fn test_create_rejects_existing_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let _first = manager.create("same").await.unwrap();
        assert!(manager.create("same").await.is_err());
    }
}
