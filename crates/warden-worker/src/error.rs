//! Failure taxonomy for worker processes and the registry.
//!
//! Errors are cloned into every pending request a single event affects, so
//! the enum is `Clone`; I/O errors are wrapped in `Arc` for that reason.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;
use warden_protocol::WireError;

/// How a worker subprocess went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashCause {
    /// The subprocess exited.
    Exited {
        /// Exit code, when the process exited normally.
        code: Option<i32>,
        /// Terminating signal, when the process was killed.
        signal: Option<i32>,
    },
    /// The subprocess could not be started.
    Spawn {
        /// Description of the spawn failure.
        message: String,
    },
    /// Reading from the subprocess failed.
    Stream {
        /// Description of the read failure.
        message: String,
    },
}

impl fmt::Display for CrashCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited {
                code: Some(code), ..
            } => write!(formatter, "exited with code {code}"),
            Self::Exited {
                signal: Some(signal),
                ..
            } => write!(formatter, "terminated by signal {signal}"),
            Self::Exited { .. } => formatter.write_str("exited"),
            Self::Spawn { message } => write!(formatter, "failed to start: {message}"),
            Self::Stream { message } => write!(formatter, "channel error: {message}"),
        }
    }
}

/// Errors returned by [`crate::WorkerProcess`] and [`crate::WorkerRegistry`].
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// The engine could not be located. Not a process failure.
    #[error("engine not found: {message}")]
    NotFound {
        /// Message reported by the worker.
        message: String,
    },

    /// The subprocess died or never started.
    #[error("worker for {worker_root} crashed: {cause}")]
    Crashed {
        /// Root the worker was started in.
        worker_root: Utf8PathBuf,
        /// Process id of the dead subprocess, when it had started.
        pid: Option<u32>,
        /// What happened.
        cause: CrashCause,
    },

    /// A request could not be written to the subprocess.
    #[error("failed to send request to worker for {worker_root}: {source}")]
    Transport {
        /// Root the worker was started in.
        worker_root: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The worker was disposed before the request completed.
    #[error("worker for {worker_root} was disposed")]
    Disposed {
        /// Root the worker was started in.
        worker_root: Utf8PathBuf,
    },

    /// The engine raised an error inside the worker.
    #[error("{message}")]
    Remote {
        /// Error class reported by the worker.
        name: Option<String>,
        /// Error message.
        message: String,
        /// Stack or cause chain.
        stack: Option<String>,
        /// Machine-readable code.
        code: Option<String>,
    },

    /// The circuit breaker is open for this project.
    #[error(
        "worker for {worker_root} is cooling down after repeated crashes; retrying in {}s",
        retry_in.as_secs().max(1)
    )]
    Unavailable {
        /// Root of the affected worker.
        worker_root: Utf8PathBuf,
        /// Time until the breaker closes on its own.
        retry_in: Duration,
        /// Whether this failure should be surfaced to the user.
        notify_user: bool,
        /// Message of the crash that opened the breaker.
        last_crash: Option<String>,
    },

    /// A message could not be encoded or decoded.
    #[error("failed to encode or decode worker message: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },
}

impl WorkerError {
    /// Returns `true` for failures that count towards the circuit breaker.
    #[must_use]
    pub const fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed { .. } | Self::Transport { .. })
    }

    /// Returns `true` when the engine could not be located.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Builds an error from a failure response.
    #[must_use]
    pub fn from_wire(error: WireError) -> Self {
        if error.is_not_found() {
            return Self::NotFound {
                message: error.message,
            };
        }
        Self::Remote {
            name: error.name,
            message: error.message,
            stack: error.stack,
            code: error.code,
        }
    }

    pub(crate) fn codec(error: &serde_json::Error) -> Self {
        Self::Codec {
            message: error.to_string(),
        }
    }
}
