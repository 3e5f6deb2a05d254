//! Shared configuration for the warden binaries.
//!
//! [`Config`] is layered by `ortho_config` from built-in defaults, an optional
//! `warden.toml` file (`--config-path` / `WARDEN_CONFIG_PATH`), `WARDEN_*`
//! environment variables, and command-line flags. Lower crates never see the
//! loader; they receive plain settings values derived from the accessors
//! below.

mod defaults;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use warden_protocol::PackageManager;

pub use defaults::{
    DEFAULT_COOLDOWN_MS, DEFAULT_CRASH_THRESHOLD, DEFAULT_ENGINE_HOST, DEFAULT_ENGINE_PACKAGE,
    DEFAULT_ENGINE_TIMEOUT_MS, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_POOLED_WORKERS, DEFAULT_NOTIFICATION_WINDOW_MS, default_engine_host,
    default_engine_package, default_log_filter, default_log_filter_string, default_log_format,
    default_package_manager,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration shared by the CLI and the service layer.
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WARDEN")]
pub struct Config {
    /// `tracing` filter expression, e.g. `info,warden_worker=debug`.
    #[ortho_config(default = defaults::default_log_filter_string())]
    log_filter: String,
    /// Output format of the log subscriber.
    #[ortho_config(default = defaults::default_log_format())]
    log_format: LogFormat,
    /// Name of the engine package resolved inside workers.
    #[ortho_config(default = defaults::default_engine_package())]
    engine_package: String,
    /// Worker binary spawned for each project.
    #[ortho_config(default = defaults::default_engine_host())]
    engine_host: PathBuf,
    /// Idle period in milliseconds before a worker disposes itself.
    #[ortho_config(default = DEFAULT_IDLE_TIMEOUT_MS)]
    idle_timeout_ms: u64,
    /// Wall-clock limit in milliseconds for one engine invocation.
    #[ortho_config(default = DEFAULT_ENGINE_TIMEOUT_MS)]
    engine_timeout_ms: u64,
    /// Consecutive crashes that open the cooldown window.
    #[ortho_config(default = DEFAULT_CRASH_THRESHOLD)]
    crash_threshold: u32,
    /// Cooldown length in milliseconds.
    #[ortho_config(default = DEFAULT_COOLDOWN_MS)]
    cooldown_ms: u64,
    /// Window in milliseconds for throttling unavailability warnings.
    #[ortho_config(default = DEFAULT_NOTIFICATION_WINDOW_MS)]
    notification_window_ms: u64,
    /// Maximum number of pooled worker processes.
    #[ortho_config(default = DEFAULT_MAX_POOLED_WORKERS)]
    max_pooled_workers: usize,
    /// Package manager whose global directory is searched last.
    #[ortho_config(default = defaults::default_package_manager())]
    package_manager: PackageManager,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            engine_package: default_engine_package(),
            engine_host: default_engine_host(),
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            engine_timeout_ms: DEFAULT_ENGINE_TIMEOUT_MS,
            crash_threshold: DEFAULT_CRASH_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            notification_window_ms: DEFAULT_NOTIFICATION_WINDOW_MS,
            max_pooled_workers: DEFAULT_MAX_POOLED_WORKERS,
            package_manager: default_package_manager(),
        }
    }
}

impl Config {
    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Engine package name.
    #[must_use]
    pub fn engine_package(&self) -> &str {
        self.engine_package.as_str()
    }

    /// Worker binary path.
    #[must_use]
    pub fn engine_host(&self) -> &Path {
        self.engine_host.as_path()
    }

    /// Idle timeout applied to every worker process.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Time limit for a single engine invocation.
    #[must_use]
    pub const fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    /// Consecutive crashes before cooldown.
    #[must_use]
    pub const fn crash_threshold(&self) -> u32 {
        self.crash_threshold
    }

    /// Cooldown window length.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Unavailability warning throttle window.
    #[must_use]
    pub const fn notification_window(&self) -> Duration {
        Duration::from_millis(self.notification_window_ms)
    }

    /// Pool capacity.
    #[must_use]
    pub const fn max_pooled_workers(&self) -> usize {
        self.max_pooled_workers
    }

    /// Package manager hint.
    #[must_use]
    pub const fn package_manager(&self) -> PackageManager {
        self.package_manager
    }

    /// Returns a copy with a different log filter, used by CLI overrides.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Returns a copy logging in `format`.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Returns a copy with a different worker binary.
    #[must_use]
    pub fn with_engine_host(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_host = path.into();
        self
    }
}
