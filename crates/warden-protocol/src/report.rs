//! Transport-safe subset of the engine's lint and resolve results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Rule name the engine uses for parse failures.
pub const SYNTAX_ERROR_RULE: &str = "CssSyntaxError";

/// Severity attached to an engine warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WarningSeverity {
    /// Rule configured as an error.
    #[default]
    Error,
    /// Rule configured as a warning.
    Warning,
}

/// One problem reported by the engine. Positions are 1-based.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineWarning {
    /// Start line.
    pub line: u32,
    /// Start column.
    pub column: u32,
    /// End line, when the engine knows the span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    /// End column, when the engine knows the span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
    /// Rule that produced the warning.
    pub rule: String,
    /// Severity.
    #[serde(default)]
    pub severity: WarningSeverity,
    /// Message, usually suffixed with `(rule-name)`.
    pub text: String,
}

impl EngineWarning {
    /// Returns `true` when the warning reports a parse failure.
    #[must_use]
    pub fn is_syntax_error(&self) -> bool {
        self.rule == SYNTAX_ERROR_RULE
    }
}

/// A configuration problem reported for a rule option.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidOptionWarning {
    /// Message describing the invalid option.
    pub text: String,
}

/// Results for a single linted source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    /// Source path, when the engine echoed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Rule warnings.
    #[serde(default)]
    pub warnings: Vec<EngineWarning>,
    /// Invalid rule option warnings.
    #[serde(default)]
    pub invalid_option_warnings: Vec<InvalidOptionWarning>,
    /// Whether the engine skipped the file because of ignore patterns.
    #[serde(default)]
    pub ignored: bool,
}

/// Documentation metadata for a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleMeta {
    /// Link to the rule's documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Whether the rule is deprecated.
    #[serde(default)]
    pub deprecated: bool,
}

/// Result of a `lint` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LintResult {
    /// Per-source reports.
    #[serde(default)]
    pub results: Vec<FileReport>,
    /// Fixed source text when fixing was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Metadata for the rules that appear in `results`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rule_metadata: BTreeMap<String, RuleMeta>,
}

impl LintResult {
    /// Iterates over every warning across all reports.
    pub fn warnings(&self) -> impl Iterator<Item = &EngineWarning> {
        self.results.iter().flat_map(|report| report.warnings.iter())
    }

    /// Returns `true` when any report contains a parse failure.
    #[must_use]
    pub fn has_syntax_error(&self) -> bool {
        self.warnings().any(EngineWarning::is_syntax_error)
    }

    /// Returns the documentation link for a rule, if known.
    #[must_use]
    pub fn rule_url(&self, rule: &str) -> Option<&str> {
        self.rule_metadata
            .get(rule)
            .and_then(|meta| meta.url.as_deref())
    }
}

/// Where the worker found the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ResolutionSource {
    /// The configured engine path.
    Explicit,
    /// A `node_modules` directory above the document or worker root.
    Local,
    /// The project's Plug'n'Play resolver.
    Pnp,
    /// A package manager's global module directory.
    Global,
}

/// Result of a `resolve` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResult {
    /// Entry point that the worker executes.
    pub engine_path: PathBuf,
    /// Version declared by the engine package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Resolution strategy that succeeded.
    pub resolved_from: ResolutionSource,
}
