//! Session State Management
//!
//! Tracks the live state of one running program.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{oneshot, Mutex, Notify};

/// Writable end of a program's standard input
pub type InputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Sources are being built
    Compiling,
    /// Program is running
    Running,
    /// A `stdin_request` is outstanding; held until the next input is
    /// delivered, even if the program prints more in the meantime
    AwaitingInput,
    /// Program exited
    Terminated,
    /// Session failed
    Errored,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Compiling
    }
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Errored)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compiling => write!(f, "compiling"),
            Self::Running => write!(f, "running"),
            Self::AwaitingInput => write!(f, "awaiting_input"),
            Self::Terminated => write!(f, "terminated"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Registry entry for one session
pub struct SessionState {
    /// Unique session identifier
    pub id: String,
    pub status: SessionStatus,
    /// Process ID while running
    pub pid: Option<u32>,
    /// Workspace directory owned by this session
    pub workspace: PathBuf,
    /// Number of input lines delivered so far
    pub pending_input_seq: u64,
    /// Set once a `stdin_request` went out, cleared by input delivery
    pub awaiting_input: bool,
    /// Program stdin; `None` once the process is gone
    pub(crate) input: Arc<Mutex<Option<InputSink>>>,
    /// Signalled after every delivered line
    pub(crate) input_delivered: Arc<Notify>,
    /// Kill switch held for runner shutdown
    pub(crate) kill_tx: Option<oneshot::Sender<()>>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionState {
    /// Create a running session entry
    pub fn new(id: impl Into<String>, workspace: impl AsRef<Path>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: SessionStatus::Running,
            pid: None,
            workspace: workspace.as_ref().to_path_buf(),
            pending_input_seq: 0,
            awaiting_input: false,
            input: Arc::new(Mutex::new(None)),
            input_delivered: Arc::new(Notify::new()),
            kill_tx: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_input(mut self, sink: InputSink) -> Self {
        self.input = Arc::new(Mutex::new(Some(sink)));
        self
    }

    pub fn with_kill_switch(mut self, kill_tx: oneshot::Sender<()>) -> Self {
        self.kill_tx = Some(kill_tx);
        self
    }

    /// Handle the engine waits on to learn about delivered input
    pub fn input_notifier(&self) -> Arc<Notify> {
        self.input_delivered.clone()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Serializable session info for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub status: SessionStatus,
    pub pid: Option<u32>,
    pub pending_input_seq: u64,
    pub awaiting_input: bool,
    pub created_at: String,
    pub last_activity: String,
}

impl From<&SessionState> for SessionInfo {
    fn from(state: &SessionState) -> Self {
        Self {
            id: state.id.clone(),
            status: state.status,
            pid: state.pid,
            pending_input_seq: state.pending_input_seq,
            awaiting_input: state.awaiting_input,
            created_at: state.created_at.to_rfc3339(),
            last_activity: state.last_activity.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_creation() {
        let state = SessionState::new("test-123", "/tmp/session-test-123").with_pid(Some(42));
        assert_eq!(state.id, "test-123");
        assert_eq!(state.status, SessionStatus::Running);
        assert_eq!(state.pid, Some(42));
        assert_eq!(state.pending_input_seq, 0);
        assert!(!state.awaiting_input);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Terminated.is_terminal());
        assert!(SessionStatus::Errored.is_terminal());
        assert!(!SessionStatus::AwaitingInput.is_terminal());
        assert_eq!(SessionStatus::AwaitingInput.to_string(), "awaiting_input");
    }

    #[test]
    fn test_session_info_serialization() {
        let state = SessionState::new("s1", "/tmp/s1");
        let info = SessionInfo::from(&state);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["pendingInputSeq"], 0);
    }
}
