//! The engine capability and its command-line implementation.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::debug;
use warden_protocol::{FileReport, LintOptions, RuleMeta};

use crate::HOST_TARGET;
use crate::command::{CommandOutput, CommandSpec, RunOptions, run_command};
use crate::error::EngineError;
use crate::resolver::{PnpScripts, ResolvedEngine};

/// Documentation base for rules bundled with the engine.
const RULE_DOCS_BASE: &str = "https://stylelint.io/user-guide/rules";
/// Filename given to stdin input when the request names no file.
const ANONYMOUS_INPUT: &str = "<input>.css";

/// Exit status for "lint ran and found problems".
const EXIT_PROBLEMS: i32 = 2;

/// Raw output of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Per-source reports.
    pub results: Vec<FileReport>,
    /// Fixed source text, when fixing was requested.
    pub output: Option<String>,
}

/// Something that can lint source text.
pub trait Engine {
    /// Lints `options.code`.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine fails rather than reporting.
    fn lint(&self, options: &LintOptions) -> Result<EngineReport, EngineError>;

    /// Snapshot of documentation metadata for the engine's rules.
    fn rule_metadata(&self) -> BTreeMap<String, RuleMeta> {
        BTreeMap::new()
    }
}

/// Turns a resolved installation into an [`Engine`].
pub trait EngineLoader {
    /// Loads the engine at `resolved`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unusable`] when the installation cannot serve
    /// lint requests.
    fn load(&self, resolved: &ResolvedEngine) -> Result<Box<dyn Engine>, EngineError>;
}

/// Source of rule documentation links.
pub trait RuleMetadataSource {
    /// Returns metadata for every known rule.
    fn snapshot(&self) -> BTreeMap<String, RuleMeta>;
}

/// Rules bundled under `lib/rules/<name>/` in the engine package.
#[derive(Debug, Clone)]
pub struct RuleDirectory {
    dir: PathBuf,
}

impl RuleDirectory {
    /// Uses the rule directory of `package_dir`.
    #[must_use]
    pub fn new(package_dir: &Path) -> Self {
        Self {
            dir: package_dir.join("lib").join("rules"),
        }
    }
}

impl RuleMetadataSource for RuleDirectory {
    fn snapshot(&self) -> BTreeMap<String, RuleMeta> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return BTreeMap::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(|name| {
                let meta = RuleMeta {
                    url: Some(format!("{RULE_DOCS_BASE}/{name}")),
                    deprecated: false,
                };
                (name, meta)
            })
            .collect()
    }
}

/// Runs the engine's command-line entry point under `node` for each lint.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    node: PathBuf,
    entry: PathBuf,
    cwd: PathBuf,
    pnp: Option<PnpScripts>,
    rules: RuleDirectory,
    timeout: Duration,
}

impl CommandEngine {
    /// Creates an engine for a resolved installation.
    #[must_use]
    pub fn new(
        node: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
        resolved: &ResolvedEngine,
    ) -> Self {
        Self {
            node: node.into(),
            entry: resolved.entry.clone(),
            cwd: cwd.into(),
            pnp: None,
            rules: RuleDirectory::new(&resolved.package_dir),
            timeout: Duration::from_secs(30),
        }
    }

    /// Runs the engine with the project's Plug'n'Play hooks loaded.
    #[must_use]
    pub fn with_pnp(mut self, pnp: Option<PnpScripts>) -> Self {
        self.pnp = pnp;
        self
    }

    /// Overrides the per-lint timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the command line for `options`; the returned file holds an
    /// inline configuration and must outlive the run.
    fn command(
        &self,
        options: &LintOptions,
    ) -> Result<(CommandSpec, Option<NamedTempFile>), EngineError> {
        let mut spec = CommandSpec::new(&self.cwd, &self.node);
        if let Some(pnp) = &self.pnp {
            spec = spec
                .arg("--require")
                .arg(pnp.register.to_string_lossy());
            if let Some(loader) = &pnp.loader {
                spec = spec
                    .arg("--experimental-loader")
                    .arg(loader.to_string_lossy());
            }
        }
        let filename = options
            .code_filename
            .as_deref()
            .map_or_else(
                || String::from(ANONYMOUS_INPUT),
                |path| path.to_string_lossy().into_owned(),
            );
        spec = spec
            .arg(self.entry.to_string_lossy())
            .args(["--formatter", "json", "--stdin-filename"])
            .arg(filename);

        let staged = match &options.config {
            Some(config) => Some(stage_config(config)?),
            None => None,
        };
        if let Some(file) = &staged {
            spec = spec.arg("--config").arg(file.path().to_string_lossy());
        } else if let Some(config_file) = &options.config_file {
            spec = spec.arg("--config").arg(config_file.to_string_lossy());
        }
        if let Some(basedir) = &options.config_basedir {
            spec = spec.arg("--config-basedir").arg(basedir.to_string_lossy());
        } else if staged.is_some() {
            spec = spec.arg("--config-basedir").arg(self.cwd.to_string_lossy());
        }
        if let Some(syntax) = &options.custom_syntax {
            spec = spec.arg("--custom-syntax").arg(syntax.as_str());
        }
        let flags = [
            (options.fix, "--fix"),
            (options.ignore_disables, "--ignore-disables"),
            (options.report_needless_disables, "--report-needless-disables"),
            (options.report_invalid_scope_disables, "--report-invalid-scope-disables"),
            (options.report_descriptionless_disables, "--report-descriptionless-disables"),
        ];
        for (enabled, flag) in flags {
            if enabled {
                spec = spec.arg(flag);
            }
        }
        Ok((spec, staged))
    }
}

impl Engine for CommandEngine {
    fn lint(&self, options: &LintOptions) -> Result<EngineReport, EngineError> {
        let (spec, _staged) = self.command(options)?;
        debug!(target: HOST_TARGET, command = %spec, "running engine");
        let run = RunOptions {
            timeout: self.timeout,
            stdin: Some(options.code.clone()),
            ..RunOptions::default()
        };
        let output = run_command(&spec, run).map_err(|source| EngineError::Spawn {
            command: spec.to_string(),
            source,
        })?;
        if output.timed_out {
            return Err(EngineError::Timeout {
                timeout: self.timeout,
            });
        }
        parse_output(&output, options.fix)
    }

    fn rule_metadata(&self) -> BTreeMap<String, RuleMeta> {
        self.rules.snapshot()
    }
}

fn stage_config(config: &serde_json::Value) -> Result<NamedTempFile, EngineError> {
    let stage = || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("warden-config-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut file, config).map_err(std::io::Error::other)?;
        file.flush()?;
        Ok(file)
    };
    stage().map_err(|source| EngineError::StageConfig { source })
}

/// Interprets the engine's exit status and streams.
///
/// With `fix`, the engine prints the fixed source to stdout and its report
/// to stderr.
fn parse_output(output: &CommandOutput, fix: bool) -> Result<EngineReport, EngineError> {
    let code = output.status.code();
    if !matches!(code, Some(0 | EXIT_PROBLEMS)) {
        return Err(EngineError::Failed {
            code,
            message: summarise(&output.stderr, code),
            stderr: output.stderr.clone(),
        });
    }
    if fix {
        if let Some(results) = parse_report(&output.stdout) {
            return Ok(EngineReport {
                results,
                output: None,
            });
        }
        return Ok(EngineReport {
            results: parse_report(&output.stderr).unwrap_or_default(),
            output: Some(output.stdout.clone()),
        });
    }
    let results = parse_report(&output.stdout).ok_or_else(|| EngineError::InvalidOutput {
        message: format!(
            "expected a JSON report, got {} bytes{}",
            output.stdout.len(),
            if output.truncated { " (truncated)" } else { "" }
        ),
    })?;
    Ok(EngineReport {
        results,
        output: None,
    })
}

fn parse_report(text: &str) -> Option<Vec<FileReport>> {
    let trimmed = text.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// First meaningful stderr line, without the `Error:` prefix.
fn summarise(stderr: &str, code: Option<i32>) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("Error:").map_or(line, str::trim_start))
        .map_or_else(
            || match code {
                Some(code) => format!("engine exited with code {code}"),
                None => String::from("engine was terminated by a signal"),
            },
            str::to_owned,
        )
}

/// Loads [`CommandEngine`]s.
#[derive(Debug, Clone)]
pub struct CommandEngineLoader {
    node: PathBuf,
    cwd: PathBuf,
    pnp: Option<PnpScripts>,
    timeout: Duration,
}

impl CommandEngineLoader {
    /// Creates a loader running engines under `node` from `cwd`.
    #[must_use]
    pub fn new(
        node: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
        pnp: Option<PnpScripts>,
        timeout: Duration,
    ) -> Self {
        Self {
            node: node.into(),
            cwd: cwd.into(),
            pnp,
            timeout,
        }
    }
}

impl EngineLoader for CommandEngineLoader {
    fn load(&self, resolved: &ResolvedEngine) -> Result<Box<dyn Engine>, EngineError> {
        if !resolved.entry.is_file() {
            return Err(EngineError::Unusable {
                path: resolved.entry.clone(),
                reason: String::from("entry point is not a file"),
            });
        }
        let engine = CommandEngine::new(&self.node, &self.cwd, resolved)
            .with_pnp(self.pnp.clone())
            .with_timeout(self.timeout);
        Ok(Box::new(engine))
    }
}
