//! Session Manager
//!
//! Lock-free concurrent registry of running sessions using DashMap.
//! The engine inserts an entry when a program starts and removes it when the
//! program ends; the gateway uses it to deliver input.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

use super::state::{SessionInfo, SessionState, SessionStatus};
use crate::error::{RunnerError, RunnerResult};

/// Session Manager - registry shared by the engine and the gateway
pub struct SessionManager {
    /// Live sessions (session_id -> SessionState)
    sessions: DashMap<String, SessionState>,
    /// Recently finished session ids and when they finished
    finished: DashMap<String, Instant>,
    /// Maximum concurrent sessions allowed
    max_sessions: usize,
    /// How long finished ids are remembered
    finished_retention: Duration,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self::with_limits(32, Duration::from_secs(300))
    }

    /// Create with custom limits
    pub fn with_limits(max_sessions: usize, finished_retention: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            finished: DashMap::new(),
            max_sessions,
            finished_retention,
        }
    }

    /// Fail when no further session may start
    pub fn check_capacity(&self) -> RunnerResult<()> {
        if self.sessions.len() >= self.max_sessions {
            return Err(RunnerError::TooManySessions(self.max_sessions));
        }
        Ok(())
    }

    /// Insert a freshly spawned session
    pub fn register(&self, state: SessionState) -> RunnerResult<()> {
        self.check_capacity()?;

        let id = state.id.clone();
        match self.sessions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RunnerError::SessionExists(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!("Registered session {} (pid {:?})", id, state.pid);
                slot.insert(state);
                Ok(())
            }
        }
    }

    /// Flag the session as waiting for input.
    ///
    /// Returns true only on the transition, so the caller emits at most one
    /// `stdin_request` per wait.
    pub fn mark_awaiting_input(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) if !session.is_terminal() && !session.awaiting_input => {
                session.awaiting_input = true;
                session.status = SessionStatus::AwaitingInput;
                session.touch();
                debug!("Session {} awaiting input", session_id);
                true
            }
            _ => false,
        }
    }

    /// Write `text` plus a newline to the session's program.
    ///
    /// Returns the number of lines delivered so far.
    pub async fn send_input(&self, session_id: &str, text: &str) -> RunnerResult<u64> {
        let (input, notifier) = match self.sessions.get(session_id) {
            Some(session) if session.is_terminal() => {
                return Err(RunnerError::ProcessAlreadyTerminated(session_id.to_string()));
            }
            Some(session) => (session.input.clone(), session.input_delivered.clone()),
            None if self.recently_finished(session_id) => {
                return Err(RunnerError::ProcessAlreadyTerminated(session_id.to_string()));
            }
            None => return Err(RunnerError::SessionNotFound(session_id.to_string())),
        };

        {
            let mut guard = input.lock().await;
            let sink = guard
                .as_mut()
                .ok_or_else(|| RunnerError::ProcessAlreadyTerminated(session_id.to_string()))?;

            let mut line = String::with_capacity(text.len() + 1);
            line.push_str(text);
            line.push('\n');

            let written = match sink.write_all(line.as_bytes()).await {
                Ok(()) => sink.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                return Err(if e.kind() == ErrorKind::BrokenPipe {
                    RunnerError::ProcessAlreadyTerminated(session_id.to_string())
                } else {
                    RunnerError::Runtime(format!("failed to write input: {}", e))
                });
            }
        }

        let seq = match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.pending_input_seq += 1;
                session.awaiting_input = false;
                if !session.is_terminal() {
                    session.status = SessionStatus::Running;
                }
                session.touch();
                session.pending_input_seq
            }
            // the program exited right after reading
            None => return Ok(0),
        };

        notifier.notify_one();
        debug!("Delivered input #{} to session {}", seq, session_id);
        Ok(seq)
    }

    /// Move a session to a terminal status and close its input
    pub async fn mark_terminal(&self, session_id: &str, status: SessionStatus) {
        let input = match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.status = status;
                session.awaiting_input = false;
                session.pid = None;
                session.touch();
                session.input.clone()
            }
            None => return,
        };

        input.lock().await.take();
        debug!("Session {} is {}", session_id, status);
    }

    /// Drop a session from the registry, remembering its id
    pub fn remove(&self, session_id: &str) -> Option<SessionInfo> {
        let removed = self.sessions.remove(session_id);
        if removed.is_some() {
            self.finished.insert(session_id.to_string(), Instant::now());
            info!("Removed session {}", session_id);
        }
        self.prune_finished();
        removed.map(|(_, state)| SessionInfo::from(&state))
    }

    fn recently_finished(&self, session_id: &str) -> bool {
        self.finished
            .get(session_id)
            .map(|at| at.elapsed() < self.finished_retention)
            .unwrap_or(false)
    }

    fn prune_finished(&self) {
        let retention = self.finished_retention;
        self.finished.retain(|_, at| at.elapsed() < retention);
    }

    /// Ask every running program to stop; used on runner shutdown
    pub fn shutdown_all(&self) {
        info!("Shutting down all sessions...");
        for mut session in self.sessions.iter_mut() {
            if let Some(tx) = session.kill_tx.take() {
                if tx.send(()).is_err() {
                    warn!("Session {} already stopped", session.id);
                }
            }
        }
    }

    pub fn get_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|s| SessionInfo::from(s.value()))
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|s| SessionInfo::from(s.value()))
            .collect()
    }

    pub fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn piped_session(id: &str) -> (SessionState, tokio::io::DuplexStream) {
        let (writer, reader) = tokio::io::duplex(1024);
        let state = SessionState::new(id, format!("/tmp/session-{}", id)).with_input(Box::new(writer));
        (state, reader)
    }

    #[test]
    fn test_register_and_remove() {
        let manager = SessionManager::new();
        manager.register(SessionState::new("s1", "/tmp/s1")).unwrap();
        assert!(manager.session_exists("s1"));
        assert_eq!(manager.session_count(), 1);

        let duplicate = manager.register(SessionState::new("s1", "/tmp/s1"));
        assert!(matches!(duplicate, Err(RunnerError::SessionExists(_))));

        assert!(manager.remove("s1").is_some());
        assert!(manager.remove("s1").is_none());
        assert!(!manager.session_exists("s1"));
    }

    #[test]
    fn test_max_sessions() {
        let manager = SessionManager::with_limits(2, Duration::from_secs(60));
        manager.register(SessionState::new("a", "/tmp/a")).unwrap();
        manager.register(SessionState::new("b", "/tmp/b")).unwrap();
        let result = manager.register(SessionState::new("c", "/tmp/c"));
        assert!(matches!(result, Err(RunnerError::TooManySessions(2))));
        assert!(manager.check_capacity().is_err());
    }

    #[tokio::test]
    async fn test_send_input_unknown_session() {
        let manager = SessionManager::new();
        let result = manager.send_input("missing", "1").await;
        assert!(matches!(result, Err(RunnerError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_send_input_writes_line_and_clears_flag() {
        let manager = SessionManager::new();
        let (state, mut reader) = piped_session("s1");
        manager.register(state).unwrap();

        assert!(manager.mark_awaiting_input("s1"));
        assert_eq!(manager.get_info("s1").unwrap().status, SessionStatus::AwaitingInput);

        let seq = manager.send_input("s1", "41").await.unwrap();
        assert_eq!(seq, 1);

        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"41\n");

        let info = manager.get_info("s1").unwrap();
        assert!(!info.awaiting_input);
        assert_eq!(info.status, SessionStatus::Running);
        assert_eq!(info.pending_input_seq, 1);
    }

    #[tokio::test]
    async fn test_awaiting_status_held_until_input() {
        let manager = SessionManager::new();
        let (state, _reader) = piped_session("s1");
        manager.register(state).unwrap();

        assert!(manager.mark_awaiting_input("s1"));
        // a later quiet window while still waiting changes nothing
        assert!(!manager.mark_awaiting_input("s1"));
        let info = manager.get_info("s1").unwrap();
        assert_eq!((info.status, info.awaiting_input), (SessionStatus::AwaitingInput, true));

        manager.send_input("s1", "1").await.unwrap();
        let info = manager.get_info("s1").unwrap();
        assert_eq!((info.status, info.awaiting_input), (SessionStatus::Running, false));
    }

    #[tokio::test]
    async fn test_single_outstanding_request_between_inputs() {
        let manager = SessionManager::new();
        let (state, _reader) = piped_session("s1");
        manager.register(state).unwrap();

        assert!(manager.mark_awaiting_input("s1"));
        assert!(!manager.mark_awaiting_input("s1"));
        assert!(!manager.mark_awaiting_input("s1"));

        manager.send_input("s1", "x").await.unwrap();
        assert!(manager.mark_awaiting_input("s1"));
        assert!(!manager.mark_awaiting_input("s1"));
    }

    #[tokio::test]
    async fn test_send_input_after_termination_does_not_write() {
        let manager = SessionManager::new();
        let (state, mut reader) = piped_session("s1");
        manager.register(state).unwrap();

        manager.mark_terminal("s1", SessionStatus::Terminated).await;
        let result = manager.send_input("s1", "late").await;
        assert!(matches!(result, Err(RunnerError::ProcessAlreadyTerminated(_))));
        assert!(!manager.mark_awaiting_input("s1"));

        manager.remove("s1");
        let result = manager.send_input("s1", "later").await;
        assert!(matches!(result, Err(RunnerError::ProcessAlreadyTerminated(_))));

        // the sink was closed without anything written to it
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_finished_ids_expire() {
        let manager = SessionManager::with_limits(4, Duration::from_millis(0));
        manager.register(SessionState::new("s1", "/tmp/s1")).unwrap();
        manager.remove("s1");
        let result = manager.send_input("s1", "x").await;
        assert!(matches!(result, Err(RunnerError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_shutdown_all_fires_kill_switch() {
        let manager = SessionManager::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        manager
            .register(SessionState::new("s1", "/tmp/s1").with_kill_switch(tx))
            .unwrap();

        manager.shutdown_all();
        assert!(rx.await.is_ok());
    }
}
