//! One engine worker subprocess and its request channel.
//!
//! Requests are newline-delimited JSON written to the child's stdin and
//! correlated with responses by id, so any number of callers may have a
//! request in flight at once. A reader thread owns the child's stdout; when
//! it reaches end-of-file the child is reaped and every request written to
//! that child fails with [`WorkerError::Crashed`]. The next request spawns a
//! fresh child.

mod idle;
mod state;


use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tracing::{debug, info, warn};
use warden_protocol::{
    LintPayload, LintResult, RequestKind, ResolvePayload, ResolveResult, WorkerRequest,
    WorkerResponse,
};

use self::idle::IdleTimer;
use self::state::{Inner, Outcome, PendingRequest, ProcessState, RequestPipe, RunningChild};
use crate::error::{CrashCause, WorkerError};
use crate::identity::ProjectIdentity;
use crate::settings::WorkerSettings;

/// Tracing target for worker process lifecycle events.
pub(crate) const PROCESS_TARGET: &str = "warden_worker::process";

/// Time a child is given to exit before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// A lazily spawned engine worker subprocess.
pub struct WorkerProcess {
    identity: ProjectIdentity,
    settings: WorkerSettings,
    shared: Arc<Shared>,
}

/// State shared with the reader and watchdog threads.
pub(crate) struct Shared {
    worker_root: Utf8PathBuf,
    state: Mutex<Inner>,
    idle: IdleTimer,
    idle_timeout: Duration,
    next_id: AtomicU64,
}

impl WorkerProcess {
    /// Creates a worker for `identity`. No subprocess is started yet.
    #[must_use]
    pub fn new(identity: ProjectIdentity, settings: WorkerSettings) -> Self {
        let shared = Arc::new(Shared {
            worker_root: identity.worker_root().to_owned(),
            state: Mutex::new(Inner::default()),
            idle: IdleTimer::default(),
            idle_timeout: settings.idle_timeout,
            next_id: AtomicU64::new(1),
        });
        Self {
            identity,
            settings,
            shared,
        }
    }

    /// Project this worker serves.
    #[must_use]
    pub const fn identity(&self) -> &ProjectIdentity {
        &self.identity
    }

    /// Directory the subprocess runs in.
    #[must_use]
    pub fn worker_root(&self) -> &Utf8Path {
        self.identity.worker_root()
    }

    /// Process id of the live subprocess, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match &self.shared.lock().process {
            ProcessState::Running(running) => Some(running.child.id()),
            ProcessState::NotStarted | ProcessState::Disposed => None,
        }
    }

    /// Returns `true` once the worker has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self.shared.lock().process, ProcessState::Disposed)
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Lints a document.
    ///
    /// # Errors
    ///
    /// Returns the failure reported by the worker, or a process-level error
    /// when the subprocess could not answer.
    pub fn lint(&self, payload: &LintPayload) -> Result<LintResult, WorkerError> {
        let payload = serde_json::to_value(payload).map_err(|e| WorkerError::codec(&e))?;
        match self.request(RequestKind::Lint, Some(payload))? {
            None | Some(Value::Null) => Ok(LintResult::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| WorkerError::codec(&e)),
        }
    }

    /// Locates the engine. `Ok(None)` means it could not be found.
    ///
    /// # Errors
    ///
    /// Returns process-level failures and engine errors other than
    /// "not found".
    pub fn resolve(&self, payload: &ResolvePayload) -> Result<Option<ResolveResult>, WorkerError> {
        let payload = serde_json::to_value(payload).map_err(|e| WorkerError::codec(&e))?;
        match self.request(RequestKind::Resolve, Some(payload)) {
            Ok(None | Some(Value::Null)) => Ok(None),
            Ok(Some(value)) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| WorkerError::codec(&e)),
            Err(WorkerError::NotFound { message }) => {
                debug!(
                    target: PROCESS_TARGET,
                    worker_root = %self.worker_root(),
                    message,
                    "engine not found"
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Sends one request and blocks until its response, the child's exit, or
    /// disposal.
    ///
    /// # Errors
    ///
    /// See [`WorkerError`].
    pub fn request(
        &self,
        kind: RequestKind,
        payload: Option<Value>,
    ) -> Result<Option<Value>, WorkerError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let line = serde_json::to_string(&WorkerRequest::new(id.clone(), kind, payload))
            .map_err(|e| WorkerError::codec(&e))?;
        let (reply, outcome) = mpsc::channel();

        let pipe = {
            let mut inner = self.shared.lock();
            let running = self.ensure_running(&mut inner)?;
            let (generation, pipe) = (running.generation, running.pipe.clone());
            inner
                .pending
                .insert(id.clone(), PendingRequest { generation, reply });
            pipe
        };

        if let Err(error) = pipe.write_line(&line) {
            // A crash or disposal may already have settled the request.
            if self.shared.lock().pending.remove(&id).is_none() {
                return self.await_outcome(&outcome);
            }
            warn!(
                target: PROCESS_TARGET,
                worker_root = %self.worker_root(),
                request = %kind,
                error = %error,
                "failed to write request"
            );
            return Err(WorkerError::Transport {
                worker_root: self.shared.worker_root.clone(),
                source: Arc::new(error),
            });
        }
        debug!(target: PROCESS_TARGET, id, request = %kind, "request sent");

        self.await_outcome(&outcome)
    }

    fn await_outcome(&self, outcome: &Receiver<Outcome>) -> Result<Option<Value>, WorkerError> {
        outcome.recv().unwrap_or_else(|_| {
            Err(WorkerError::Disposed {
                worker_root: self.shared.worker_root.clone(),
            })
        })
    }

    /// Terminates the subprocess and fails all pending requests with
    /// [`WorkerError::Disposed`]. Safe to call more than once.
    pub fn dispose(&self) {
        self.shared.dispose("disposed by owner");
    }

    fn ensure_running<'a>(
        &self,
        inner: &'a mut Inner,
    ) -> Result<&'a mut RunningChild, WorkerError> {
        if matches!(inner.process, ProcessState::NotStarted) {
            let running = self.spawn(inner.generation + 1)?;
            inner.generation = running.generation;
            inner.process = ProcessState::Running(running);
            IdleTimer::ensure_watchdog(&Arc::downgrade(&self.shared), &self.shared.idle);
            self.shared.idle.touch(self.shared.idle_timeout);
        }
        match &mut inner.process {
            ProcessState::Running(running) => Ok(running),
            ProcessState::NotStarted | ProcessState::Disposed => Err(WorkerError::Disposed {
                worker_root: self.shared.worker_root.clone(),
            }),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.settings.program);
        command.args(&self.settings.args);
        if let Some(pnp) = self.identity.pnp() {
            command.arg("--pnp-register").arg(pnp.register());
            if let Some(loader) = pnp.loader() {
                command.arg("--pnp-loader").arg(loader);
            }
        }
        command
            .current_dir(self.identity.worker_root())
            .envs(self.settings.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn spawn(&self, generation: u64) -> Result<RunningChild, WorkerError> {
        let worker_root = &self.shared.worker_root;
        let crashed = |message: String| WorkerError::Crashed {
            worker_root: worker_root.clone(),
            pid: None,
            cause: CrashCause::Spawn { message },
        };

        let mut child = self.command().spawn().map_err(|error| {
            warn!(
                target: PROCESS_TARGET,
                worker_root = %worker_root,
                program = %self.settings.program.display(),
                error = %error,
                "failed to spawn worker"
            );
            crashed(error.to_string())
        })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(crashed(String::from("worker stdio was not captured")));
        };

        let pid = child.id();
        self.start_reader(stdout, generation)
            .and_then(|()| start_stderr_drain(stderr, worker_root.clone()))
            .map_err(|error| {
                let _ = child.kill();
                let _ = child.wait();
                crashed(error.to_string())
            })?;

        info!(
            target: PROCESS_TARGET,
            worker_root = %worker_root,
            pid,
            generation,
            "worker started"
        );
        Ok(RunningChild {
            child,
            pipe: RequestPipe::new(stdin),
            generation,
        })
    }

    fn start_reader(&self, stdout: ChildStdout, generation: u64) -> std::io::Result<()> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(String::from("warden-worker-stdout"))
            .spawn(move || shared.read_responses(stdout, generation))
            .map(drop)
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.shared.dispose("worker dropped");
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WorkerProcess")
            .field("identity", &self.identity)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

fn start_stderr_drain(stderr: ChildStderr, worker_root: Utf8PathBuf) -> std::io::Result<()> {
    thread::Builder::new()
        .name(String::from("warden-worker-stderr"))
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => debug!(
                        target: PROCESS_TARGET,
                        worker_root = %worker_root,
                        stderr = %line,
                        "worker stderr"
                    ),
                    Err(_) => break,
                }
            }
        })
        .map(drop)
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_responses(&self, stdout: ChildStdout, generation: u64) {
        let mut failure = None;
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => self.deliver(&line),
                Err(error) => {
                    failure = Some(error.to_string());
                    break;
                }
            }
        }
        self.handle_exit(generation, failure);
    }

    fn deliver(&self, line: &str) {
        let response: WorkerResponse = match serde_json::from_str(line) {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    worker_root = %self.worker_root,
                    error = %error,
                    "ignoring malformed worker output"
                );
                return;
            }
        };
        self.idle.touch(self.idle_timeout);

        let Some(pending) = self.lock().pending.remove(&response.id) else {
            debug!(
                target: PROCESS_TARGET,
                id = %response.id,
                "response for unknown request"
            );
            return;
        };
        let outcome = response.into_outcome().map_err(WorkerError::from_wire);
        let _ = pending.reply.send(outcome);
    }

    /// Reaps the child of `generation` and fails its pending requests.
    fn handle_exit(&self, generation: u64, failure: Option<String>) {
        let (running, pending) = {
            let mut inner = self.lock();
            (inner.detach(generation), inner.take_pending_for(generation))
        };
        let Some(running) = running else {
            // Disposed or already replaced; pending requests were settled.
            return;
        };

        let RunningChild { mut child, pipe, .. } = running;
        drop(pipe);
        let pid = child.id();
        let cause = match failure {
            Some(message) => {
                reap(&mut child);
                CrashCause::Stream { message }
            }
            None => reap(&mut child),
        };

        if pending.is_empty() {
            info!(
                target: PROCESS_TARGET,
                worker_root = %self.worker_root,
                pid,
                cause = %cause,
                "worker exited"
            );
            return;
        }
        warn!(
            target: PROCESS_TARGET,
            worker_root = %self.worker_root,
            pid,
            cause = %cause,
            pending = pending.len(),
            "worker crashed with requests in flight"
        );
        let error = WorkerError::Crashed {
            worker_root: self.worker_root.clone(),
            pid: Some(pid),
            cause,
        };
        for request in pending {
            let _ = request.reply.send(Err(error.clone()));
        }
    }

    pub(crate) fn dispose(&self, reason: &str) {
        let (previous, pending) = {
            let mut inner = self.lock();
            if matches!(inner.process, ProcessState::Disposed) {
                return;
            }
            let previous = std::mem::replace(&mut inner.process, ProcessState::Disposed);
            (previous, std::mem::take(&mut inner.pending))
        };
        self.idle.stop();

        if let ProcessState::Running(running) = previous {
            let pid = running.child.id();
            shutdown(running, self.next_id.fetch_add(1, Ordering::Relaxed));
            info!(
                target: PROCESS_TARGET,
                worker_root = %self.worker_root,
                pid,
                reason,
                "worker disposed"
            );
        }

        let error = WorkerError::Disposed {
            worker_root: self.worker_root.clone(),
        };
        for request in pending.into_values() {
            let _ = request.reply.send(Err(error.clone()));
        }
    }
}

/// Asks the child to exit, then kills it once the grace period elapses.
///
/// The shutdown line is written from a helper thread, which the kill releases
/// if the child has stopped reading stdin.
fn shutdown(running: RunningChild, id: u64) {
    let RunningChild { mut child, pipe, .. } = running;
    if let Ok(line) = serde_json::to_string(&WorkerRequest::shutdown(id.to_string())) {
        drop(
            thread::Builder::new()
                .name(String::from("warden-worker-shutdown"))
                .spawn(move || drop(pipe.write_line(&line))),
        );
    }
    drop(wait_or_kill(&mut child));
}

/// Collects the exit status of a child whose stdout has closed.
fn reap(child: &mut Child) -> CrashCause {
    match wait_or_kill(child) {
        Ok(status) => CrashCause::Exited {
            code: status.code(),
            signal: exit_signal(status),
        },
        Err(error) => CrashCause::Stream {
            message: error.to_string(),
        },
    }
}

/// Polls for exit during the grace period, then kills the child.
fn wait_or_kill(child: &mut Child) -> std::io::Result<ExitStatus> {
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => thread::sleep(SHUTDOWN_POLL),
            Err(_) => break,
        }
    }
    let _ = child.kill();
    child.wait()
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}
