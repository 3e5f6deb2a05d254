//! Command-line front end over the warden runner.
//!
//! `warden lint <file>` lints one stylesheet through a pooled engine worker
//! and prints the diagnostics (and fixed text, with `--fix`) as JSON.
//! `warden resolve <file>` prints which engine installation would be used.
//! Configuration flags precede the subcommand; see [`warden_config::Config`].

mod config;

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::{fs, path};

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use warden_config::Config;
use warden_protocol::PackageManager;
use warden_service::{
    Document, LintSettings, RunnerService, ServiceError, TelemetryError, WorkspaceService,
    telemetry,
};

use self::config::{ConfigLoader, OrthoConfigLoader, split_arguments};

/// Command-line interface for the warden lint router.
#[derive(Parser, Debug)]
#[command(name = "warden", disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Lints a stylesheet and prints its diagnostics.
    Lint {
        /// Stylesheet to lint.
        file: PathBuf,
        /// Returns fixed text alongside the diagnostics.
        #[arg(long)]
        fix: bool,
        #[command(flatten)]
        target: TargetArgs,
        /// Configuration file to use instead of discovery.
        #[arg(long)]
        config_file: Option<PathBuf>,
        /// Custom syntax module, e.g. `postcss-scss`.
        #[arg(long)]
        custom_syntax: Option<String>,
    },
    /// Prints the engine installation that would lint a file.
    Resolve {
        /// File whose project is inspected.
        file: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(clap::Args, Debug)]
struct TargetArgs {
    /// Workspace folder the file belongs to.
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Explicit engine package or entry point.
    #[arg(long)]
    engine_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to read {}: {source}", path.display())]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
    #[error("failed to serialise output: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Runs the CLI with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, W, E, L>(args: I, stdout: &mut W, stderr: &mut E, loader: &L) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_arguments(&args);

    let result = Cli::try_parse_from(split.command_arguments.iter().cloned())
        .map_err(AppError::CliUsage)
        .and_then(|cli| {
            loader
                .load(&split.config_arguments)
                .map(|config| (cli, config))
        })
        .and_then(|(cli, config)| execute(cli.command, &config, stdout));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::CliUsage(error)) if !error.use_stderr() => {
            if write!(stdout, "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            if writeln!(stderr, "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write>(command: CliCommand, config: &Config, stdout: &mut W) -> Result<(), AppError> {
    telemetry::initialise(config)?;
    let runner = RunnerService::new(WorkspaceService::from_config(config));
    let outcome = match command {
        CliCommand::Lint {
            file,
            fix,
            target,
            config_file,
            custom_syntax,
        } => {
            let document = load_document(&file, target.workspace.as_deref())?;
            let settings = LintSettings {
                fix,
                config_file,
                custom_syntax,
                ..target.settings(config.package_manager())
            };
            runner
                .lint_document(&document, &settings)
                .map_err(AppError::from)
                .and_then(|outcome| print_json(stdout, &outcome))
        }
        CliCommand::Resolve { file, target } => {
            let document = document_at(&file, target.workspace.as_deref())?;
            runner
                .resolve_engine(&document, &target.settings(config.package_manager()))
                .map_err(AppError::from)
                .and_then(|resolved| print_json(stdout, &resolved))
        }
    };
    runner.dispatch().shutdown();
    outcome
}

impl TargetArgs {
    fn settings(&self, package_manager: PackageManager) -> LintSettings {
        LintSettings {
            engine_path: self.engine_path.clone(),
            package_manager: Some(package_manager),
            ..LintSettings::default()
        }
    }
}

fn load_document(file: &Path, workspace: Option<&Path>) -> Result<Document, AppError> {
    let text = fs::read_to_string(file).map_err(|source| AppError::ReadDocument {
        path: file.to_path_buf(),
        source,
    })?;
    Ok(Document {
        text,
        ..document_at(file, workspace)?
    })
}

fn document_at(file: &Path, workspace: Option<&Path>) -> Result<Document, AppError> {
    let document = Document::new(absolute_utf8(file)?, String::new());
    match workspace {
        Some(root) => Ok(document.in_workspace(absolute_utf8(root)?)),
        None => Ok(document),
    }
}

fn absolute_utf8(path: &Path) -> Result<Utf8PathBuf, AppError> {
    let absolute = path::absolute(path).map_err(|source| AppError::ReadDocument {
        path: path.to_path_buf(),
        source,
    })?;
    Utf8PathBuf::from_path_buf(absolute).map_err(|path| AppError::NonUtf8Path { path })
}

fn print_json<W: Write, T: Serialize>(stdout: &mut W, value: &T) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *stdout, value)?;
    writeln!(stdout).map_err(AppError::Output)
}
