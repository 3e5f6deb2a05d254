//! Host-to-worker request envelope and payloads.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::options::{LintOptions, RunnerOptions};

/// Operation requested from the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestKind {
    /// Lint a document.
    Lint,
    /// Locate the engine and report its version.
    Resolve,
    /// Ask the worker to exit after answering.
    Shutdown,
}

/// One request line written to the worker's stdin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRequest {
    /// Correlation id, unique for the lifetime of one worker instance.
    pub id: String,
    /// Requested operation.
    #[serde(rename = "type")]
    pub kind: RequestKind,
    /// Operation-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl WorkerRequest {
    /// Builds a request with the given id, kind and payload.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: RequestKind,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }

    /// Builds a shutdown request.
    #[must_use]
    pub fn shutdown(id: impl Into<String>) -> Self {
        Self::new(id, RequestKind::Shutdown, None)
    }
}

/// Payload of a `lint` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LintPayload {
    /// Engine options for this call.
    pub options: LintOptions,
    /// Explicit engine location, absolute or relative to the worker root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_path: Option<PathBuf>,
    /// Resolution hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_options: Option<RunnerOptions>,
}

impl LintPayload {
    /// Creates a payload for the given options.
    #[must_use]
    pub fn new(options: LintOptions) -> Self {
        Self {
            options,
            engine_path: None,
            runner_options: None,
        }
    }

    /// Returns a copy carrying different engine options.
    #[must_use]
    pub fn with_options(&self, options: LintOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }
}

/// Payload of a `resolve` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvePayload {
    /// Explicit engine location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_path: Option<PathBuf>,
    /// Document whose directory anchors local resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,
    /// Resolution hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_options: Option<RunnerOptions>,
}
