use std::path::PathBuf;

use warden_protocol::PackageManager;

use crate::logging::LogFormat;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Engine package resolved inside worker processes when none is configured.
pub const DEFAULT_ENGINE_PACKAGE: &str = "stylelint";

/// Worker binary launched for each pooled project.
pub const DEFAULT_ENGINE_HOST: &str = "warden-engine-host";

/// Idle period after which a worker process disposes itself.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 120_000;

/// Wall-clock limit for a single engine invocation inside a worker.
pub const DEFAULT_ENGINE_TIMEOUT_MS: u64 = 30_000;

/// Consecutive crashes that open a worker's cooldown window.
pub const DEFAULT_CRASH_THRESHOLD: u32 = 3;

/// Length of the cooldown window once the crash threshold is reached.
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

/// Window within which only one unavailability warning is surfaced.
pub const DEFAULT_NOTIFICATION_WINDOW_MS: u64 = 60_000;

/// Upper bound on concurrently pooled worker processes.
pub const DEFAULT_MAX_POOLED_WORKERS: usize = 32;

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned engine package name.
#[must_use]
pub fn default_engine_package() -> String {
    DEFAULT_ENGINE_PACKAGE.to_owned()
}

/// Worker binary path, resolved through `PATH` when relative.
#[must_use]
pub fn default_engine_host() -> PathBuf {
    PathBuf::from(DEFAULT_ENGINE_HOST)
}

/// Package manager assumed for global engine lookups.
#[must_use]
pub const fn default_package_manager() -> PackageManager {
    PackageManager::Npm
}
