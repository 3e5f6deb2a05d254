//! Pooled, crash-tolerant engine worker processes.
//!
//! The engine runs in a subprocess because it is untrusted, varies by
//! project, and can hang or crash. [`WorkerProcess`] owns one such
//! subprocess: it spawns it on first use, correlates concurrent requests by
//! id, surfaces exits as [`WorkerError::Crashed`], and disposes itself after
//! a period of inactivity.
//!
//! [`WorkerRegistry`] pools processes by [`ProjectIdentity`] and wraps every
//! call in a circuit breaker. Repeated crashes open a cooldown window during
//! which calls fail fast with [`WorkerError::Unavailable`] instead of
//! spawning; at most one of those failures per notification window asks to
//! be shown to the user. Editing activity in the project closes the breaker
//! early.
//!
//! Neither type retries on its own. The process reports exactly what
//! happened to exactly the requests affected; the registry only decides
//! whether the next call may spawn.

mod error;
mod identity;
pub mod process;
pub mod registry;
mod settings;

#[cfg(test)]
mod tests;

pub use self::error::{CrashCause, WorkerError};
pub use self::identity::{IdentityKey, ProjectIdentity, WorkerContext};
pub use self::process::WorkerProcess;
#[cfg(any(test, feature = "test-support"))]
pub use self::registry::ManualClock;
pub use self::registry::{Clock, HealthState, SystemClock, WorkerRegistry};
pub use self::settings::{RegistrySettings, WorkerSettings};
