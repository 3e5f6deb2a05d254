//! Behavioural coverage for configuration precedence.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ortho_config::OrthoConfig;
use once_cell::sync::Lazy;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use warden_config::{
    Config, DEFAULT_CRASH_THRESHOLD, default_engine_package, default_log_filter,
    default_log_format,
};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const COOLDOWN_KEY: &str = "WARDEN_COOLDOWN_MS";

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        let harness = Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("warden")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _guard: guard,
        };
        harness.remove_env(COOLDOWN_KEY);
        harness
    }

    fn write_config(&self, body: &str) {
        let path = self.temp_dir.path().join("warden.toml");
        if let Err(error) = fs::write(&path, body) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is serialised by `ENV_MUTEX` and undone on drop.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn remove_env(&self, key: &str) {
        let previous = std::env::var_os(key);
        unsafe { std::env::remove_var(key) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(os_value) => unsafe { std::env::set_var(&key, os_value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the cooldown to {millis} milliseconds")]
fn given_configuration_file(harness: &Harness, millis: u64) {
    harness.write_config(&format!("cooldown_ms = {millis}\n"));
}

#[given("the environment overrides the cooldown to {millis} milliseconds")]
fn given_environment_override(harness: &Harness, millis: u64) {
    harness.set_env(COOLDOWN_KEY, &millis.to_string());
}

#[when("the CLI sets the cooldown to {millis} milliseconds")]
fn when_cli_override(harness: &Harness, millis: u64) {
    harness.push_cli_arg("--cooldown-ms");
    harness.push_cli_arg(millis.to_string());
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the cooldown to {millis} milliseconds")]
fn then_resolved_cooldown(harness: &Harness, millis: u64) {
    let config = harness.loaded_config();
    assert_eq!(config.cooldown(), Duration::from_millis(millis));
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();

    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert_eq!(config.engine_package(), default_engine_package());
    assert_eq!(config.crash_threshold(), DEFAULT_CRASH_THRESHOLD);
}

#[scenario(
    path = "tests/features/configuration_layers.feature",
    name = "Built-in defaults apply without overrides"
)]
fn defaults_apply(harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/configuration_layers.feature",
    name = "A configuration file sets the cooldown"
)]
fn file_sets_cooldown(harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/configuration_layers.feature",
    name = "The environment overrides the configuration file"
)]
fn environment_overrides_file(harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/configuration_layers.feature",
    name = "The command line overrides the environment"
)]
fn cli_overrides_environment(harness: Harness) {
    drop(harness);
}
