//! Session Events
//!
//! The event protocol pushed to a caller, and the per-session emitter that
//! guarantees a single terminal event.

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::RunnerError;

/// Events emitted on a run stream, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunEvent {
    /// Progress note, e.g. a successful build
    Status { message: String },

    /// The program is running under this session id
    Session { session_id: String },

    /// Chunk read from the program's standard output
    Stdout { content: String },

    /// Chunk read from the program's standard error
    Stderr { content: String },

    /// The program is probably blocked reading standard input
    StdinRequest { session_id: String },

    /// The program exited; carries everything it printed
    Done {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The session failed
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl RunEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Build the `error` event for a runner failure
    pub fn from_error(err: &RunnerError) -> Self {
        Self::Error {
            error: err.to_string(),
            code: Some(err.code().to_string()),
            message: err.detail(),
        }
    }

    /// `done` and `error` end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Session { .. } => "session",
            Self::Stdout { .. } => "stdout",
            Self::Stderr { .. } => "stderr",
            Self::StdinRequest { .. } => "stdin_request",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// Push side of one session's event stream.
///
/// Nothing is sent after the first terminal event. A dropped receiver marks
/// the emitter disconnected; later sends are discarded.
pub struct SessionEventEmitter {
    tx: mpsc::Sender<RunEvent>,
    finished: bool,
    disconnected: bool,
}

impl SessionEventEmitter {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self {
            tx,
            finished: false,
            disconnected: false,
        }
    }

    /// Create an emitter and the receiving end of its stream
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Send an event. Returns false when it was not delivered.
    pub async fn emit(&mut self, event: RunEvent) -> bool {
        if self.finished {
            debug!("Dropping {} event after terminal event", event.kind());
            return false;
        }
        if event.is_terminal() {
            self.finished = true;
        }
        if self.disconnected {
            return false;
        }
        if self.tx.send(event).await.is_err() {
            self.disconnected = true;
            return false;
        }
        true
    }

    pub async fn emit_error(&mut self, err: &RunnerError) -> bool {
        self.emit(RunEvent::from_error(err)).await
    }

    /// Resolves once the receiving side is gone
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn mark_disconnected(&mut self) {
        self.disconnected = true;
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected || self.tx.is_closed()
    }
}
