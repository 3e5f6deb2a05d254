//! Errors raised while resolving or running the engine.

use std::error::Error as _;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use warden_protocol::WireError;

/// Failure of a single request inside the worker.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine package could not be located.
    #[error("unable to locate {package}: {detail}")]
    NotFound {
        /// Package that was looked for.
        package: String,
        /// What was searched.
        detail: String,
    },

    /// A package was found but cannot be used as the engine.
    #[error("{} is not a usable engine: {reason}", path.display())]
    Unusable {
        /// Package directory or entry point.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// The engine process could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The engine did not finish in time.
    #[error("engine timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Configured limit.
        timeout: Duration,
    },

    /// The engine exited with a fatal status.
    #[error("{message}")]
    Failed {
        /// Exit code, when available.
        code: Option<i32>,
        /// First meaningful line of the engine's error output.
        message: String,
        /// Full error output.
        stderr: String,
    },

    /// The engine's output could not be understood.
    #[error("engine returned invalid output: {message}")]
    InvalidOutput {
        /// Parse error details.
        message: String,
    },

    /// An inline configuration could not be staged for the engine.
    #[error("failed to stage inline configuration: {source}")]
    StageConfig {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The request payload was malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Decode error details.
        message: String,
    },
}

impl EngineError {
    /// Class name reported to the host.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::Unusable { .. } => "NotFoundError",
            Self::Spawn { .. } | Self::Timeout { .. } | Self::Failed { .. } => "EngineError",
            Self::InvalidOutput { .. } => "InvalidOutputError",
            Self::StageConfig { .. } => "ConfigurationError",
            Self::InvalidRequest { .. } => "InvalidRequestError",
        }
    }

    /// Serialises the error for the response channel.
    ///
    /// Resolution failures carry the not-found code so the host can treat
    /// them as "nothing to report".
    #[must_use]
    pub fn to_wire(&self) -> WireError {
        let base = match self {
            Self::NotFound { .. } | Self::Unusable { .. } => WireError::not_found(self.to_string()),
            _ => WireError::new(self.to_string()),
        };
        let wire = base.with_name(self.name());
        match self.stack() {
            Some(stack) => wire.with_stack(stack),
            None => wire,
        }
    }

    fn stack(&self) -> Option<String> {
        if let Self::Failed { stderr, .. } = self {
            let trimmed = stderr.trim();
            return (!trimmed.is_empty()).then(|| trimmed.to_owned());
        }
        let mut chain = Vec::new();
        let mut source = self.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        (!chain.is_empty()).then(|| chain.join("\n"))
    }
}
