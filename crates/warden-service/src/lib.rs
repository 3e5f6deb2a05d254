//! Host-side services that route lint work to isolated engine workers.
//!
//! [`WorkspaceService`] maps a document to the project that owns it and runs
//! the request on that project's pooled worker, classifying failures into
//! "nothing to show" and errors worth reporting. [`RunnerService`] sits on
//! top: it builds engine options from [`LintSettings`], retries with an
//! empty rule set when the project has no usable configuration, and turns
//! engine warnings into LSP diagnostics.
//!
//! [`telemetry::initialise`] installs the process-wide tracing subscriber
//! described by [`warden_config::Config`].

mod error;
pub mod runner;
mod settings;
pub mod telemetry;
pub mod workspace;

#[cfg(test)]
mod tests;

pub use self::error::ServiceError;
pub use self::runner::{
    DIAGNOSTIC_SOURCE, Document, LintDispatch, LintOutcome, LintSettings, NO_RULES_MESSAGE,
    RunnerService, to_diagnostics,
};
pub use self::settings::{HOST_LOG_FILTER_ENV, registry_settings, worker_settings};
pub use self::telemetry::{TelemetryError, TelemetryHandle};
pub use self::workspace::{FileChange, FileChangeKind, WorkspaceService};
