//! Worker-to-host response envelope.

use serde::{Deserialize, Serialize};

/// Error code reserved for "engine could not be located".
///
/// The host maps it back to a not-found outcome instead of a failure.
pub const NOT_FOUND_CODE: &str = "ENGINE_NOT_FOUND";

/// Serialised form of an error raised inside the worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireError {
    /// Error class name, e.g. `ConfigurationError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Optional backtrace or causal chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl WireError {
    /// Builds an error carrying only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Builds a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            name: Some(String::from("NotFoundError")),
            message: message.into(),
            stack: None,
            code: Some(NOT_FOUND_CODE.to_owned()),
        }
    }

    /// Attaches an error class name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a stack or cause chain.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Returns `true` when the error carries the reserved not-found code.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code.as_deref() == Some(NOT_FOUND_CODE)
    }
}

/// One response line written to the worker's stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResponse {
    /// Id of the request being answered.
    pub id: String,
    /// Whether the request succeeded.
    pub success: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error payload on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WorkerResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: impl Into<String>, result: Option<serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            success: true,
            result,
            error: None,
        }
    }

    /// Builds a failure response.
    #[must_use]
    pub fn failure(id: impl Into<String>, error: WireError) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// Splits the envelope into its outcome.
    ///
    /// # Errors
    ///
    /// Returns the carried [`WireError`] for failure responses. A failure
    /// without error details yields a generic error.
    pub fn into_outcome(self) -> Result<Option<serde_json::Value>, WireError> {
        if self.success {
            return Ok(self.result);
        }
        Err(self
            .error
            .unwrap_or_else(|| WireError::new("worker reported a failure without details")))
    }
}
