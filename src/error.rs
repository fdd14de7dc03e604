//! Runner Error Types
//!
//! Every failure the execution subsystem can surface, with stable
//! machine-readable codes shared by the event stream and the HTTP surface.

use thiserror::Error;

/// Errors produced while compiling, running, or talking to a session
#[derive(Error, Debug)]
pub enum RunnerError {
    // Environment errors
    #[error("No C++ compiler available on this host")]
    CompilerNotFound,

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Maximum concurrent sessions reached: {0}")]
    TooManySessions(usize),

    // Workspace errors
    #[error("Workspace error: {0}")]
    Workspace(String),

    // Build errors
    #[error("Compilation failed")]
    CompilationFailed(String),

    #[error("Compilation timed out after {0}s")]
    CompilationTimeout(u64),

    // Execution errors
    #[error("Failed to start program: {0}")]
    SpawnFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Execution time limit of {0}s exceeded")]
    ExecutionTimeout(u64),

    // Protocol-usage errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Process already terminated for session {0}")]
    ProcessAlreadyTerminated(String),
}

impl RunnerError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::CompilerNotFound => "compiler_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::TooManySessions(_) => "too_many_sessions",
            Self::Workspace(_) => "workspace_error",
            Self::CompilationFailed(_) => "compilation_failed",
            Self::CompilationTimeout(_) => "compilation_timeout",
            Self::SpawnFailed(_) => "spawn_failed",
            Self::Runtime(_) => "runtime_error",
            Self::ExecutionTimeout(_) => "execution_timeout",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionExists(_) => "session_exists",
            Self::ProcessAlreadyTerminated(_) => "process_already_terminated",
        }
    }

    /// Extra detail carried alongside the headline message, if any.
    ///
    /// Compiler diagnostics travel here so the `error` field stays short.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::CompilationFailed(diagnostics) => Some(diagnostics.clone()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::Runtime(err.to_string())
    }
}

/// Result type alias for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;
