//! Tunables for worker processes and the registry.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// How worker subprocesses are launched and retired.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Executable that speaks the worker protocol.
    pub program: PathBuf,
    /// Arguments passed before the per-project arguments.
    pub args: Vec<OsString>,
    /// Variables added to the inherited environment.
    pub env: Vec<(OsString, OsString)>,
    /// Inactivity period after which the worker is disposed.
    pub idle_timeout: Duration,
}

impl WorkerSettings {
    /// Builds settings launching `program` with no extra arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            idle_timeout: Duration::from_secs(120),
        }
    }

    /// Appends a launch argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<OsString>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Overrides the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// Circuit-breaker and pooling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Consecutive crashes that open the breaker.
    pub crash_threshold: u32,
    /// How long the breaker stays open.
    pub cooldown: Duration,
    /// Minimum spacing between user-facing unavailability notices.
    pub notification_window: Duration,
    /// Pooled workers kept before the least recently used is retired.
    pub max_workers: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            crash_threshold: 3,
            cooldown: Duration::from_secs(30),
            notification_window: Duration::from_secs(60),
            max_workers: 32,
        }
    }
}
