//! Engine invocation options carried inside lint and resolve payloads.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Options forwarded to the engine for a single lint call.
///
/// Field names follow the engine's own option names so that the worker can
/// translate them to command-line flags without a mapping table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LintOptions {
    /// Source text to lint.
    pub code: String,
    /// Path the text belongs to; drives config lookup and syntax selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_filename: Option<PathBuf>,
    /// Inline configuration object; replaces any discovered config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// Explicit configuration file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Directory relative to which config `extends`/`plugins` are resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_basedir: Option<PathBuf>,
    /// Custom syntax module name, e.g. `postcss-scss`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_syntax: Option<String>,
    /// Ask the engine for fixed output.
    #[serde(default)]
    pub fix: bool,
    /// Ignore inline disable comments.
    #[serde(default)]
    pub ignore_disables: bool,
    /// Report disable comments that suppress nothing.
    #[serde(default)]
    pub report_needless_disables: bool,
    /// Report disable comments naming rules outside their scope.
    #[serde(default)]
    pub report_invalid_scope_disables: bool,
    /// Report disable comments without a description.
    #[serde(default)]
    pub report_descriptionless_disables: bool,
}

impl LintOptions {
    /// Creates options for linting `code` as the file at `path`.
    #[must_use]
    pub fn new(code: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            code: code.into(),
            code_filename: Some(path.into()),
            ..Self::default()
        }
    }

    /// Returns a copy configured with an empty rule set.
    ///
    /// The engine then only reports syntax errors, which is what callers fall
    /// back to when the project's own configuration is missing or unusable.
    #[must_use]
    pub fn with_empty_rules(&self) -> Self {
        Self {
            config: Some(serde_json::json!({ "rules": {} })),
            config_file: None,
            ..self.clone()
        }
    }
}

/// Package managers whose global module directory can host the engine.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PackageManager {
    /// `npm root -g`.
    #[default]
    Npm,
    /// `yarn global dir`.
    Yarn,
    /// `pnpm root -g`.
    Pnpm,
}

/// Errors encountered while parsing a [`PackageManager`] from text.
pub type PackageManagerParseError = strum::ParseError;

/// Host-side settings that influence how the worker resolves the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerOptions {
    /// Package manager consulted for global resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<PackageManager>,
}

impl RunnerOptions {
    /// Creates options with an explicit package manager hint.
    #[must_use]
    pub const fn with_package_manager(package_manager: PackageManager) -> Self {
        Self {
            package_manager: Some(package_manager),
        }
    }
}
