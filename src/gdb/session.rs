//! Debugger session and command correlation
//!
//! MI output carries no command identifiers, so a response can only be
//! attributed to a command by order. A session therefore allows exactly one
//! pending command: `execute` claims the slot, writes the command, and the
//! stdout pump hands the next completed frame to whoever holds the slot.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::oneshot;

use crate::common::config::{self, Config, LaunchMode, StderrPolicy};
use crate::common::{lock, Error, Result};

use super::framer::Framer;
use super::process::{self, Supervisor};
use super::types::{Dialect, Frame};

/// Cap on buffered stderr diagnostics per frame
const MAX_DIAGNOSTICS: usize = 64 * 1024;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for the next command
    Ready,
    /// A command is pending
    Busy,
    /// The debugger died, timed out, or a command was abandoned
    Terminated,
    /// Shut down by the owner
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Busy => write!(f, "busy"),
            Self::Terminated => write!(f, "terminated"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Everything needed to start a session, minus the target
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub gdb: PathBuf,
    pub mode: LaunchMode,
    pub stderr: StderrPolicy,
    pub command_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
}

impl SessionOptions {
    /// Options with library defaults for an explicit debugger path
    pub fn new(gdb: impl Into<PathBuf>) -> Self {
        let config = Config::default();
        Self {
            gdb: gdb.into(),
            mode: config.gdb.mode,
            stderr: config.gdb.stderr,
            command_timeout: config.timeouts.command(),
            shutdown_grace: config.timeouts.shutdown_grace(),
        }
    }

    /// Options from configuration; resolves the debugger executable
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            gdb: config.resolve_gdb()?,
            mode: config.gdb.mode,
            stderr: config.gdb.stderr,
            command_timeout: config.timeouts.command(),
            shutdown_grace: config.timeouts.shutdown_grace(),
        })
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_stderr(mut self, policy: StderrPolicy) -> Self {
        self.stderr = policy;
        self
    }
}

/// The in-flight command
struct PendingCommand {
    id: u64,
    command: String,
    /// Taken when the caller has been answered early (fail-fast stderr);
    /// the slot stays occupied until the command's own frame drains.
    reply: Option<oneshot::Sender<Result<Frame>>>,
}

impl PendingCommand {
    fn answer(&mut self, result: Result<Frame>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(result);
        }
    }
}

struct Slot {
    state: SessionState,
    pending: Option<PendingCommand>,
    diagnostics: String,
}

/// State shared with the output pumps
struct Shared {
    slot: Mutex<Slot>,
    stderr_policy: StderrPolicy,
}

impl Shared {
    /// Claim the pending slot for `command`
    fn begin(&self, id: u64, command: &str) -> Result<oneshot::Receiver<Result<Frame>>> {
        let mut slot = lock(&self.slot);
        match slot.state {
            SessionState::Ready => {}
            SessionState::Busy => return Err(Error::SessionBusy),
            state => {
                return Err(Error::SessionTerminated(format!(
                    "session is {}; start a new one",
                    state
                )))
            }
        }

        let (tx, rx) = oneshot::channel();
        slot.state = SessionState::Busy;
        slot.pending = Some(PendingCommand {
            id,
            command: command.to_string(),
            reply: Some(tx),
        });
        Ok(rx)
    }

    /// Hand a completed frame to the pending command
    fn complete(&self, mut frame: Frame) {
        let mut slot = lock(&self.slot);
        frame.diagnostics = std::mem::take(&mut slot.diagnostics);

        match slot.pending.take() {
            Some(mut pending) => {
                tracing::trace!(command = %pending.command, status = ?frame.status, body = %frame.body, "GDB <<<");
                if slot.state == SessionState::Busy {
                    slot.state = SessionState::Ready;
                }
                pending.answer(Ok(frame));
            }
            None => {
                tracing::debug!(status = ?frame.status, body = %frame.body, "Discarding unsolicited frame");
            }
        }
    }

    fn on_stderr(&self, text: &str) {
        tracing::debug!(stderr = %text.trim_end(), "GDB stderr");
        let mut slot = lock(&self.slot);

        match self.stderr_policy {
            StderrPolicy::Diagnostic => {
                if slot.diagnostics.len() < MAX_DIAGNOSTICS {
                    slot.diagnostics.push_str(text);
                }
            }
            StderrPolicy::FailFast => {
                if let Some(pending) = slot.pending.as_mut() {
                    let err = Error::command_failed(&pending.command, text.trim());
                    pending.answer(Err(err));
                }
            }
        }
    }

    /// Mark the session unusable and fail whatever is pending
    fn terminate(&self, reason: &str) {
        let mut slot = lock(&self.slot);
        if slot.state != SessionState::Closed {
            slot.state = SessionState::Terminated;
        }
        if let Some(mut pending) = slot.pending.take() {
            pending.answer(Err(Error::SessionTerminated(reason.to_string())));
        }
    }

    /// Free the slot after a batch command
    fn release(&self, id: u64) {
        let mut slot = lock(&self.slot);
        if slot.pending.as_ref().map(|p| p.id) == Some(id) {
            slot.pending = None;
            if slot.state == SessionState::Busy {
                slot.state = SessionState::Ready;
            }
        }
    }

    fn is_pending(&self, id: u64) -> bool {
        lock(&self.slot).pending.as_ref().map(|p| p.id) == Some(id)
    }

    fn take_diagnostics(&self) -> String {
        std::mem::take(&mut lock(&self.slot).diagnostics)
    }

    fn state(&self) -> SessionState {
        lock(&self.slot).state
    }
}

enum Backend {
    Interactive(Supervisor),
    Batch,
}

struct SessionInner {
    target: PathBuf,
    options: SessionOptions,
    backend: Backend,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl SessionInner {
    async fn shutdown(&self) {
        {
            let mut slot = lock(&self.shared.slot);
            if slot.state == SessionState::Closed {
                return;
            }
            slot.state = SessionState::Closed;
            if let Some(mut pending) = slot.pending.take() {
                pending.answer(Err(Error::SessionTerminated(
                    "session was shut down".to_string(),
                )));
            }
        }

        if let Backend::Interactive(supervisor) = &self.backend {
            supervisor.shutdown(self.options.shutdown_grace).await;
        }
        tracing::info!(binary = %self.target.display(), "Debugger session closed");
    }

    /// Tear the session down without waiting (timeout, cancellation)
    fn abandon(&self, reason: &str) {
        self.shared.terminate(reason);
        if let Backend::Interactive(supervisor) = &self.backend {
            supervisor.kill();
        }
        tracing::info!(binary = %self.target.display(), reason, "Debugger session terminated");
    }
}

/// One debugger process (or batch configuration) for one target binary
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Cloneable handle that can shut a session down from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Weak<SessionInner>,
}

impl ShutdownHandle {
    /// Shut the session down, waking any pending command
    ///
    /// No-op if the session is already closed or dropped.
    pub async fn shutdown(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.shutdown().await;
        }
    }
}

impl Session {
    /// Start a session for `target`
    ///
    /// The debugger is looked up on `PATH` unless given as a path. Interactive
    /// mode spawns `gdb --interpreter=mi <target>` now; batch mode spawns per
    /// command.
    #[tracing::instrument(skip_all, fields(binary = %target.display(), mode = ?options.mode))]
    pub async fn start(mut options: SessionOptions, target: &Path) -> Result<Self> {
        options.gdb = config::resolve_executable(&options.gdb.to_string_lossy())?;
        tracing::info!(gdb = %options.gdb.display(), "Starting debugger session");

        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                state: SessionState::Ready,
                pending: None,
                diagnostics: String::new(),
            }),
            stderr_policy: options.stderr,
        });

        let backend = match options.mode {
            LaunchMode::Interactive => {
                let spawned = Supervisor::spawn(&options.gdb, target)?;
                tokio::spawn(pump_stdout(spawned.stdout, Arc::clone(&shared)));
                tokio::spawn(pump_stderr(spawned.stderr, Arc::clone(&shared)));
                Backend::Interactive(spawned.supervisor)
            }
            LaunchMode::Batch => Backend::Batch,
        };

        Ok(Self {
            inner: Arc::new(SessionInner {
                target: target.to_path_buf(),
                options,
                backend,
                shared,
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn target(&self) -> &Path {
        &self.inner.target
    }

    pub fn state(&self) -> SessionState {
        self.inner.shared.state()
    }

    /// Output dialect this session's commands are answered in
    pub fn dialect(&self) -> Dialect {
        match self.inner.backend {
            Backend::Interactive(_) => Dialect::Structured,
            Backend::Batch => Dialect::CliText,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Quit the debugger and close the session (idempotent)
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }

    /// Run one command and return its frame
    ///
    /// Fails with `SessionBusy` if another command is pending. Dropping the
    /// returned future before it resolves terminates an interactive session,
    /// because its output can no longer be attributed. Shutting the session
    /// down wakes the pending command in either mode.
    pub async fn execute(&self, command: &str) -> Result<Frame> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let rx = self.inner.shared.begin(id, command)?;
        let mut guard = PendingGuard {
            inner: &self.inner,
            id,
            armed: true,
        };

        let result = match &self.inner.backend {
            Backend::Interactive(supervisor) => {
                self.execute_interactive(supervisor, id, command, rx).await
            }
            Backend::Batch => {
                // Shutdown answers through `rx`; dropping the batch run kills gdb
                let result = tokio::select! {
                    biased;
                    result = self.execute_batch(command) => result,
                    reply = rx => flatten_reply(reply),
                };
                self.inner.shared.release(id);
                result
            }
        };

        guard.armed = false;
        result
    }

    async fn execute_interactive(
        &self,
        supervisor: &Supervisor,
        id: u64,
        command: &str,
        rx: oneshot::Receiver<Result<Frame>>,
    ) -> Result<Frame> {
        let started = Instant::now();
        if let Err(e) = supervisor.send(command).await {
            let reason = format!("failed to write command: {}", e);
            self.inner.abandon(&reason);
            return Err(Error::SessionTerminated(reason));
        }

        let reply = match self.inner.options.command_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    tracing::warn!(command, secs = limit.as_secs(), "Debugger command timed out");
                    self.inner.abandon("command timed out");
                    return Err(Error::CommandTimeout {
                        command: command.to_string(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => rx.await,
        };

        let result = flatten_reply(reply);
        if result.is_err() && self.inner.shared.is_pending(id) {
            // Answered early; the command's own frame is still owed
            if let Some(limit) = self.inner.options.command_timeout {
                let remaining = limit.saturating_sub(started.elapsed());
                tokio::spawn(drain_watchdog(Arc::downgrade(&self.inner), id, remaining));
            }
        }
        result
    }

    async fn execute_batch(&self, command: &str) -> Result<Frame> {
        let options = &self.inner.options;
        let output = process::run_batch(
            &options.gdb,
            &self.inner.target,
            &[command],
            options.command_timeout,
        )
        .await?;

        let Some(output) = output else {
            let secs = options.command_timeout.map(|d| d.as_secs()).unwrap_or(0);
            tracing::warn!(command, secs, "Batch debugger timed out");
            self.inner.abandon("command timed out");
            return Err(Error::CommandTimeout {
                command: command.to_string(),
                secs,
            });
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.trim().is_empty() {
            if options.stderr == StderrPolicy::FailFast {
                tracing::debug!(stderr = %stderr.trim_end(), "GDB stderr");
                return Err(Error::command_failed(command, stderr.trim()));
            }
            self.inner.shared.on_stderr(&stderr);
        }

        let mut framer = Framer::new(Dialect::CliText);
        framer.push(&output.stdout);
        let mut frame = framer.finish();
        frame.diagnostics = self.inner.shared.take_diagnostics();
        tracing::trace!(command, exit_code = ?output.exit_code, body = %frame.body, "GDB <<<");
        Ok(frame)
    }
}

type PendingReply = std::result::Result<Result<Frame>, oneshot::error::RecvError>;

fn flatten_reply(reply: PendingReply) -> Result<Frame> {
    reply.unwrap_or_else(|_| {
        Err(Error::SessionTerminated(
            "session dropped the pending command".to_string(),
        ))
    })
}

/// Terminates the session if command `id` is still draining after `limit`
async fn drain_watchdog(inner: Weak<SessionInner>, id: u64, limit: Duration) {
    tokio::time::sleep(limit).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.shared.is_pending(id) {
        tracing::warn!(id, "Debugger never finished a failed command");
        inner.abandon("command timed out after failing");
    }
}

/// Tears the session down if an `execute` future is dropped mid-command
struct PendingGuard<'a> {
    inner: &'a SessionInner,
    id: u64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.inner.shared.is_pending(self.id) {
            return;
        }
        match self.inner.backend {
            // kill_on_drop already took the batch process down
            Backend::Batch => self.inner.shared.release(self.id),
            Backend::Interactive(_) => self.inner.abandon("command was cancelled"),
        }
    }
}

async fn pump_stdout(mut stdout: ChildStdout, shared: Arc<Shared>) {
    let mut framer = Framer::new(Dialect::Structured);
    let mut chunk = [0u8; 4096];

    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                framer.push(&chunk[..n]);
                while let Some(frame) = framer.next_frame() {
                    shared.complete(frame);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error reading debugger stdout");
                break;
            }
        }
    }

    tracing::debug!(unframed_bytes = framer.pending_len(), "Debugger stdout closed");
    shared.terminate("debugger exited");
}

async fn pump_stderr(mut stderr: ChildStderr, shared: Arc<Shared>) {
    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => shared.on_stderr(&String::from_utf8_lossy(&chunk[..n])),
        }
    }
}
