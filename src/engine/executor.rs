//! Execution Engine
//!
//! Drives a session from submitted files to its terminal event: locate a
//! compiler, build, spawn, forward output, detect input waits, clean up.

use bytes::BytesMut;
use log::{debug, error, info, warn};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::heuristic::InputWaitDetector;
use super::RunRequest;
use crate::config::RunnerConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::session::{RunEvent, SessionEventEmitter, SessionManager, SessionState, SessionStatus};
use crate::toolchain::{BuildOutcome, BuildStage, ToolchainLocator};
use crate::workspace::{select_entry_file, validate_files, SourceFile, Workspace, WorkspaceManager};

const READ_CHUNK: usize = 8192;

/// How a program ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, -1 when killed by a signal
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Compiles and runs submissions, one spawned task per session
#[derive(Clone)]
pub struct ExecutionEngine {
    config: Arc<RunnerConfig>,
    sessions: Arc<SessionManager>,
    workspaces: WorkspaceManager,
    locator: ToolchainLocator,
    build: BuildStage,
}

impl ExecutionEngine {
    pub fn new(config: Arc<RunnerConfig>, sessions: Arc<SessionManager>) -> Self {
        Self {
            workspaces: WorkspaceManager::new(config.workspace.root.clone()),
            locator: ToolchainLocator::from_config(&config.toolchain),
            build: BuildStage::new(&config.build),
            config,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn locator(&self) -> &ToolchainLocator {
        &self.locator
    }

    /// Start a run in the background and return its event stream
    pub fn start(&self, request: RunRequest) -> mpsc::Receiver<RunEvent> {
        let (emitter, rx) = SessionEventEmitter::channel(self.config.engine.event_buffer);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(request, emitter).await;
        });
        rx
    }

    /// Run a submission to completion, reporting through `emitter`
    pub async fn run(&self, request: RunRequest, mut emitter: SessionEventEmitter) {
        let session_id = Uuid::new_v4().to_string();
        info!(
            "Starting session {} with {} file(s)",
            session_id,
            request.files.len()
        );
        if !request.initial_stdin_inputs.is_empty() {
            debug!(
                "Session {} carries {} initial input(s); delivery is up to the caller",
                session_id,
                request.initial_stdin_inputs.len()
            );
        }

        let workspace = match self.prepare(&session_id, &request.files).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("Session {} ended before start: {}", session_id, e);
                emitter.emit_error(&e).await;
                return;
            }
        };

        emitter.emit(RunEvent::status("Compilation successful")).await;
        self.execute(session_id, workspace, emitter).await;
    }

    /// Validate, locate a compiler, materialize and build.
    ///
    /// The compiler is located before anything touches the filesystem. On
    /// error the workspace, if one was created, is already destroyed.
    async fn prepare(&self, session_id: &str, files: &[SourceFile]) -> RunnerResult<Workspace> {
        validate_files(files)?;
        self.sessions.check_capacity()?;

        let toolchain = self
            .locator
            .locate()
            .await
            .ok_or(RunnerError::CompilerNotFound)?;
        let entry = select_entry_file(files)
            .map(|f| f.name.clone())
            .ok_or_else(|| RunnerError::InvalidRequest("no entry file".into()))?;

        let workspace = self.workspaces.create(session_id).await?;
        let mut workspace = self.workspaces.materialize(workspace, files).await?;

        match self.build.compile(&toolchain, &workspace, &entry).await {
            Ok(BuildOutcome::Success { binary }) => {
                workspace.set_binary(binary);
                Ok(workspace)
            }
            Ok(BuildOutcome::Failure { diagnostics }) => {
                debug!("Session {} failed to compile", session_id);
                workspace.destroy().await;
                Err(RunnerError::CompilationFailed(diagnostics))
            }
            Err(e) => {
                workspace.destroy().await;
                Err(e)
            }
        }
    }

    /// Spawn the built program and forward its I/O until it ends
    async fn execute(
        &self,
        session_id: String,
        mut workspace: Workspace,
        mut emitter: SessionEventEmitter,
    ) {
        if self.config.engine.kill_on_disconnect && emitter.is_disconnected() {
            info!("Caller of session {} left before the program started", session_id);
            workspace.destroy().await;
            return;
        }

        let Some(binary) = workspace.binary().map(|p| p.to_path_buf()) else {
            workspace.destroy().await;
            emitter
                .emit_error(&RunnerError::SpawnFailed("no binary produced".into()))
                .await;
            return;
        };

        let spawned = Command::new(&binary)
            .current_dir(workspace.dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let err = RunnerError::SpawnFailed(e.to_string());
                error!("Session {}: {}", session_id, err);
                workspace.destroy().await;
                emitter.emit_error(&err).await;
                return;
            }
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            kill_and_reap(&mut child).await;
            workspace.destroy().await;
            emitter
                .emit_error(&RunnerError::SpawnFailed("standard streams unavailable".into()))
                .await;
            return;
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        let state = SessionState::new(&session_id, workspace.dir())
            .with_pid(child.id())
            .with_input(Box::new(stdin))
            .with_kill_switch(kill_tx);
        let input_delivered = state.input_notifier();

        if let Err(e) = self.sessions.register(state) {
            kill_and_reap(&mut child).await;
            workspace.destroy().await;
            emitter.emit_error(&e).await;
            return;
        }

        emitter
            .emit(RunEvent::Session {
                session_id: session_id.clone(),
            })
            .await;

        let outcome = self
            .pump(
                &session_id,
                &mut child,
                stdout,
                stderr,
                input_delivered,
                kill_rx,
                &mut emitter,
            )
            .await;

        let (status, terminal) = match outcome {
            Ok(exit) => {
                info!("Session {} exited with code {}", session_id, exit.code);
                (
                    SessionStatus::Terminated,
                    RunEvent::Done {
                        exit_code: exit.code,
                        stdout: exit.stdout,
                        stderr: exit.stderr,
                    },
                )
            }
            Err(e) => {
                warn!("Session {} errored: {}", session_id, e);
                kill_and_reap(&mut child).await;
                (SessionStatus::Errored, RunEvent::from_error(&e))
            }
        };

        // release before the terminal event so a caller that saw it can rely on cleanup
        self.sessions.mark_terminal(&session_id, status).await;
        workspace.destroy().await;
        self.sessions.remove(&session_id);
        emitter.emit(terminal).await;
    }

    /// Forward output, fire input-wait requests and wait for exit
    #[allow(clippy::too_many_arguments)]
    async fn pump<O, E>(
        &self,
        session_id: &str,
        child: &mut Child,
        mut stdout: O,
        mut stderr: E,
        input_delivered: Arc<Notify>,
        mut kill_rx: oneshot::Receiver<()>,
        emitter: &mut SessionEventEmitter,
    ) -> RunnerResult<ProcessExit>
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let engine = &self.config.engine;
        let mut detector = InputWaitDetector::new(engine.quiet_delay(), engine.startup_delay());
        detector.arm_startup(Instant::now());
        let run_deadline = engine
            .max_run_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let mut out = OutputStream::new();
        let mut err = OutputStream::new();
        let mut exit: Option<ExitStatus> = None;
        let mut drain_deadline: Option<Instant> = None;
        let mut kill_armed = true;

        loop {
            if exit.is_some() && out.eof && err.eof {
                break;
            }
            if engine.kill_on_disconnect && emitter.is_disconnected() {
                info!("Caller of session {} disconnected, stopping program", session_id);
                return Err(RunnerError::Runtime("client disconnected".into()));
            }
            out.reserve();
            err.reserve();

            tokio::select! {
                read = stdout.read_buf(&mut out.buf), if !out.eof => {
                    if let Some(content) = out.absorb(read)? {
                        detector.on_output(Instant::now());
                        emitter.emit(RunEvent::Stdout { content }).await;
                    }
                }
                read = stderr.read_buf(&mut err.buf), if !err.eof => {
                    if let Some(content) = err.absorb(read)? {
                        detector.on_output(Instant::now());
                        emitter.emit(RunEvent::Stderr { content }).await;
                    }
                }
                status = child.wait(), if exit.is_none() => {
                    let status = status.map_err(|e| {
                        RunnerError::Runtime(format!("failed to wait for program: {}", e))
                    })?;
                    debug!("Session {} process exited: {}", session_id, status);
                    exit = Some(status);
                    detector.disarm();
                    drain_deadline = Some(Instant::now() + engine.exit_drain());
                }
                _ = sleep_until_opt(detector.deadline()), if exit.is_none() => {
                    if detector.fire(Instant::now()) && self.sessions.mark_awaiting_input(session_id) {
                        emitter
                            .emit(RunEvent::StdinRequest {
                                session_id: session_id.to_string(),
                            })
                            .await;
                    }
                }
                _ = input_delivered.notified(), if exit.is_none() => {
                    detector.on_input(Instant::now());
                }
                _ = sleep_until_opt(run_deadline), if exit.is_none() => {
                    return Err(RunnerError::ExecutionTimeout(
                        engine.max_run_secs.unwrap_or_default(),
                    ));
                }
                _ = sleep_until_opt(drain_deadline) => {
                    warn!(
                        "Session {} output still open {:?} after exit, closing",
                        session_id,
                        engine.exit_drain()
                    );
                    break;
                }
                _ = emitter.closed(), if !emitter.is_disconnected() => {
                    emitter.mark_disconnected();
                }
                signal = &mut kill_rx, if kill_armed && exit.is_none() => {
                    kill_armed = false;
                    if signal.is_ok() {
                        return Err(RunnerError::Runtime("runner is shutting down".into()));
                    }
                }
            }
        }

        Ok(ProcessExit {
            code: exit.and_then(|s| s.code()).unwrap_or(-1),
            stdout: out.collected,
            stderr: err.collected,
        })
    }
}

/// Read buffer and transcript for one output pipe
struct OutputStream {
    buf: BytesMut,
    collected: String,
    eof: bool,
}

impl OutputStream {
    fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            collected: String::new(),
            eof: false,
        }
    }

    fn reserve(&mut self) {
        self.buf.reserve(READ_CHUNK);
    }

    /// Turn a completed read into text to forward.
    ///
    /// A multi-byte character split across reads is held back until its
    /// remaining bytes arrive. At EOF whatever is left is flushed lossily.
    fn absorb(&mut self, read: std::io::Result<usize>) -> RunnerResult<Option<String>> {
        let n = read
            .map_err(|e| RunnerError::Runtime(format!("failed to read program output: {}", e)))?;

        let text = if n == 0 {
            self.eof = true;
            let rest = String::from_utf8_lossy(&self.buf[..]).into_owned();
            self.buf.clear();
            rest
        } else {
            decode_utf8_prefix(&mut self.buf)
        };

        if text.is_empty() {
            return Ok(None);
        }
        self.collected.push_str(&text);
        Ok(Some(text))
    }
}

/// Split off and decode the longest complete UTF-8 prefix of `buf`
fn decode_utf8_prefix(buf: &mut BytesMut) -> String {
    match std::str::from_utf8(&buf[..]) {
        Ok(text) => {
            let text = text.to_owned();
            buf.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let head = buf.split_to(e.valid_up_to());
            String::from_utf8_lossy(&head).into_owned()
        }
        Err(_) => {
            let text = String::from_utf8_lossy(&buf[..]).into_owned();
            buf.clear();
            text
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

async fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Kill request failed: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap program: {}", e);
    }
}
