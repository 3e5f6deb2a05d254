//! Lifecycle state of a worker subprocess.

use std::collections::HashMap;
use std::io::{self, Write};
use std::process::{Child, ChildStdin};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::WorkerError;

/// Result delivered to a waiting request.
pub(super) type Outcome = Result<Option<Value>, WorkerError>;

/// Reply channel of one in-flight request.
pub(super) type Reply = Sender<Outcome>;

/// A request awaiting its response.
pub(super) struct PendingRequest {
    /// Subprocess instance the request was written to.
    pub(super) generation: u64,
    pub(super) reply: Reply,
}

/// Write end of a child's stdin.
///
/// Locked on its own so a write blocked on a full pipe never holds the
/// process state the stdout reader needs.
#[derive(Clone)]
pub(super) struct RequestPipe(Arc<Mutex<ChildStdin>>);

impl RequestPipe {
    pub(super) fn new(stdin: ChildStdin) -> Self {
        Self(Arc::new(Mutex::new(stdin)))
    }

    pub(super) fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stdin = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }
}

/// Handle of a live subprocess.
pub(super) struct RunningChild {
    pub(super) child: Child,
    pub(super) pipe: RequestPipe,
    pub(super) generation: u64,
}

/// Whether a subprocess is currently attached.
#[derive(Default)]
pub(super) enum ProcessState {
    /// No subprocess; the next request spawns one.
    #[default]
    NotStarted,
    /// A subprocess is attached.
    Running(RunningChild),
    /// Terminal; no further subprocess will be spawned.
    Disposed,
}

/// Mutable state guarded by the process mutex.
#[derive(Default)]
pub(super) struct Inner {
    pub(super) process: ProcessState,
    pub(super) pending: HashMap<String, PendingRequest>,
    /// Incremented on every spawn.
    pub(super) generation: u64,
}

impl Inner {
    /// Detaches the child belonging to `generation`, leaving `NotStarted`.
    pub(super) fn detach(&mut self, generation: u64) -> Option<RunningChild> {
        match &self.process {
            ProcessState::Running(running) if running.generation == generation => {}
            _ => return None,
        }
        match std::mem::take(&mut self.process) {
            ProcessState::Running(running) => Some(running),
            other => {
                self.process = other;
                None
            }
        }
    }

    /// Removes and returns the requests written to `generation`.
    pub(super) fn take_pending_for(&mut self, generation: u64) -> Vec<PendingRequest> {
        let ids: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, request)| request.generation == generation)
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect()
    }
}
