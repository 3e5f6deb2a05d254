//! Separation of configuration flags from command tokens.
//!
//! Configuration flags must precede the subcommand; they are handed to
//! `ortho_config` while the remaining tokens go to the command parser.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use warden_config::Config;

use crate::AppError;

/// Flags understood by the configuration loader.
///
/// Keep in sync with the fields of [`Config`].
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--engine-package",
    "--engine-host",
    "--idle-timeout-ms",
    "--engine-timeout-ms",
    "--crash-threshold",
    "--cooldown-ms",
    "--notification-window-ms",
    "--max-pooled-workers",
    "--package-manager",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the filtered argument list.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify_flag(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, inline_value) = text
        .split_once('=')
        .map_or((text.as_ref(), false), |(flag, _)| (flag, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Arguments split into the loader's share and the parser's share.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    /// Program name followed by the leading configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by everything from the subcommand on.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ArgumentSplit::default();
    };
    let mut config_arguments = vec![program.clone()];
    let mut remaining = rest.iter();
    let mut command_arguments = vec![program.clone()];

    while let Some(argument) = remaining.next() {
        match classify_flag(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                if needs_value {
                    config_arguments.extend(remaining.next().cloned());
                }
            }
            FlagAction::Stop => {
                command_arguments.push(argument.clone());
                command_arguments.extend(remaining.cloned());
                break;
            }
        }
    }

    ArgumentSplit {
        config_arguments,
        command_arguments,
    }
}
