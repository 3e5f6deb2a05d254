//! Errors surfaced by the orchestration and runner services.

use std::path::PathBuf;

use thiserror::Error;
use warden_worker::WorkerError;

/// Failures returned to callers of [`crate::WorkspaceService`] and
/// [`crate::RunnerService`].
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The worker layer failed and the failure is worth reporting.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// A path handed to the service is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8Path {
        /// The offending path.
        path: PathBuf,
    },
}

impl ServiceError {
    /// Message raised by the engine itself, when the failure came from it.
    #[must_use]
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            Self::Worker(WorkerError::Remote { message, .. }) => Some(message.as_str()),
            _ => None,
        }
    }

    /// Returns `true` when the failure is the registry refusing a paused
    /// project.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Worker(WorkerError::Unavailable { .. }))
    }
}
