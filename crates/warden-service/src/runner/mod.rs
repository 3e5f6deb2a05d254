//! Single entry point for "lint this document" and "which engine applies".
//!
//! The runner builds engine options from the caller's settings, dispatches
//! them through a [`LintDispatch`] and turns the engine's report into LSP
//! diagnostics. Projects without a usable configuration still get syntax
//! checking: when the engine refuses to run for lack of configuration, the
//! request is re-issued with an empty rule set.

mod diagnostics;


use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use lsp_types::Diagnostic;
use serde::Serialize;
use tracing::{debug, info};
use warden_protocol::{
    LintOptions, LintPayload, LintResult, PackageManager, ResolvePayload, ResolveResult,
    RunnerOptions,
};

pub use self::diagnostics::{DIAGNOSTIC_SOURCE, to_diagnostics};
use self::diagnostics::configuration_diagnostic;
use crate::error::ServiceError;

/// Tracing target for fallback and fix decisions.
const RUNNER_TARGET: &str = "warden_service::runner";

/// Engine message prefix when no configuration file was found.
pub const NO_CONFIGURATION_PREFIX: &str = "No configuration provided";

/// Engine message prefix when the configuration enables no rules.
pub const NO_RULES_PREFIX: &str = "No rules found within configuration";

/// Message of the diagnostic added when the configuration has no rules.
pub const NO_RULES_MESSAGE: &str =
    "No rules found within configuration. Have you provided a \"rules\" property?";

/// Seam between the runner and whatever routes requests to workers.
pub trait LintDispatch {
    /// Lints `document` within `workspace_root`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the request fails in a way worth
    /// reporting; `Ok(None)` means there is nothing to show.
    fn lint(
        &self,
        workspace_root: &Utf8Path,
        document: &Utf8Path,
        payload: &LintPayload,
    ) -> Result<Option<LintResult>, ServiceError>;

    /// Resolves the engine that would lint `document`.
    ///
    /// # Errors
    ///
    /// As for [`lint`](Self::lint).
    fn resolve(
        &self,
        workspace_root: &Utf8Path,
        document: &Utf8Path,
        payload: &ResolvePayload,
    ) -> Result<Option<ResolveResult>, ServiceError>;
}

/// A document to lint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Absolute path of the document.
    pub path: Utf8PathBuf,
    /// Current text, which may differ from what is on disk.
    pub text: String,
    /// Workspace folder the document belongs to, if any.
    pub workspace_root: Option<Utf8PathBuf>,
}

impl Document {
    /// Builds a document outside any workspace folder.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            workspace_root: None,
        }
    }

    /// Places the document in a workspace folder.
    #[must_use]
    pub fn in_workspace(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Folder used for routing: the workspace, else the document's
    /// directory.
    #[must_use]
    pub fn routing_root(&self) -> &Utf8Path {
        self.workspace_root
            .as_deref()
            .or_else(|| self.path.parent())
            .unwrap_or(self.path.as_path())
    }
}

/// User-level settings that shape each engine invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LintSettings {
    /// Inline configuration object.
    pub config: Option<serde_json::Value>,
    /// Configuration file to use instead of discovery.
    pub config_file: Option<PathBuf>,
    /// Base directory for `extends` and `plugins`.
    pub config_basedir: Option<PathBuf>,
    /// Custom syntax module.
    pub custom_syntax: Option<String>,
    /// Explicit engine location.
    pub engine_path: Option<PathBuf>,
    /// Package manager consulted for global resolution.
    pub package_manager: Option<PackageManager>,
    /// Ask for fixed output.
    pub fix: bool,
    /// Ignore inline disable comments.
    pub ignore_disables: bool,
    /// Report disable comments that suppress nothing.
    pub report_needless_disables: bool,
    /// Report disable comments naming rules outside their scope.
    pub report_invalid_scope_disables: bool,
    /// Report disable comments without a description.
    pub report_descriptionless_disables: bool,
}

impl LintSettings {
    fn runner_options(&self) -> Option<RunnerOptions> {
        self.package_manager.map(RunnerOptions::with_package_manager)
    }

    fn lint_payload(&self, document: &Document) -> LintPayload {
        let options = LintOptions {
            config: self.config.clone(),
            config_file: self.config_file.clone(),
            config_basedir: self.config_basedir.clone(),
            custom_syntax: self.custom_syntax.clone(),
            fix: self.fix,
            ignore_disables: self.ignore_disables,
            report_needless_disables: self.report_needless_disables,
            report_invalid_scope_disables: self.report_invalid_scope_disables,
            report_descriptionless_disables: self.report_descriptionless_disables,
            ..LintOptions::new(document.text.clone(), document.path.as_std_path())
        };
        LintPayload {
            options,
            engine_path: self.engine_path.clone(),
            runner_options: self.runner_options(),
        }
    }

    fn resolve_payload(&self, document: &Document) -> ResolvePayload {
        ResolvePayload {
            engine_path: self.engine_path.clone(),
            document_path: Some(document.path.clone().into_std_path_buf()),
            runner_options: self.runner_options(),
        }
    }
}

/// Diagnostics and optional fixed text for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LintOutcome {
    /// Problems to show, positions 0-based.
    pub diagnostics: Vec<Diagnostic>,
    /// Fixed text, when a fix was requested and is safe to apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Engine refusals that are answered with a syntax-only retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    NoConfiguration,
    NoRules,
}

impl Fallback {
    fn for_error(error: &ServiceError) -> Option<Self> {
        let message = error.engine_message()?;
        if message.starts_with(NO_CONFIGURATION_PREFIX) {
            Some(Self::NoConfiguration)
        } else if message.starts_with(NO_RULES_PREFIX) {
            Some(Self::NoRules)
        } else {
            None
        }
    }
}

/// Lints and resolves documents through a [`LintDispatch`].
#[derive(Debug)]
pub struct RunnerService<D> {
    dispatch: D,
}

impl<D: LintDispatch> RunnerService<D> {
    /// Wraps `dispatch`.
    #[must_use]
    pub const fn new(dispatch: D) -> Self {
        Self { dispatch }
    }

    /// Returns the wrapped dispatcher.
    #[must_use]
    pub const fn dispatch(&self) -> &D {
        &self.dispatch
    }

    /// Lints `document` and converts the report into diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the dispatcher fails for a reason other
    /// than a missing configuration or an empty rule set.
    pub fn lint_document(
        &self,
        document: &Document,
        settings: &LintSettings,
    ) -> Result<LintOutcome, ServiceError> {
        let payload = settings.lint_payload(document);
        let root = document.routing_root();

        let (result, fallback) = match self.dispatch.lint(root, &document.path, &payload) {
            Ok(result) => (result, None),
            Err(error) => {
                let Some(fallback) = Fallback::for_error(&error) else {
                    return Err(error);
                };
                info!(
                    target: RUNNER_TARGET,
                    document = %document.path,
                    reason = ?fallback,
                    "retrying with an empty rule set"
                );
                let retry = payload.with_options(payload.options.with_empty_rules());
                (self.dispatch.lint(root, &document.path, &retry)?, Some(fallback))
            }
        };

        let mut outcome = result.map_or_else(LintOutcome::default, |result| {
            outcome_from(&result, settings.fix, &document.path)
        });
        if fallback == Some(Fallback::NoRules) {
            outcome.diagnostics.push(configuration_diagnostic(NO_RULES_MESSAGE));
        }
        Ok(outcome)
    }

    /// Resolves the engine that would lint `document`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the dispatcher fails.
    pub fn resolve_engine(
        &self,
        document: &Document,
        settings: &LintSettings,
    ) -> Result<Option<ResolveResult>, ServiceError> {
        let payload = settings.resolve_payload(document);
        self.dispatch
            .resolve(document.routing_root(), &document.path, &payload)
    }
}

fn outcome_from(result: &LintResult, fix: bool, document: &Utf8Path) -> LintOutcome {
    let output = if fix && result.has_syntax_error() {
        debug!(
            target: RUNNER_TARGET,
            document = %document,
            "discarding fix output for unparseable input"
        );
        None
    } else {
        result.output.clone()
    };
    LintOutcome {
        diagnostics: to_diagnostics(result),
        output,
    }
}
