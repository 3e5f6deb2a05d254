//! Translation of loaded configuration into worker and registry settings.

use warden_config::Config;
use warden_worker::{RegistrySettings, WorkerSettings};

/// Environment variable the engine host reads its log filter from.
pub const HOST_LOG_FILTER_ENV: &str = "WARDEN_LOG_FILTER";

/// Launch settings for engine host subprocesses.
#[must_use]
pub fn worker_settings(config: &Config) -> WorkerSettings {
    WorkerSettings::new(config.engine_host())
        .arg("--engine-package")
        .arg(config.engine_package())
        .arg("--engine-timeout-ms")
        .arg(config.engine_timeout().as_millis().to_string())
        .env(HOST_LOG_FILTER_ENV, config.log_filter())
        .with_idle_timeout(config.idle_timeout())
}

/// Circuit-breaker and pool policy.
#[must_use]
pub const fn registry_settings(config: &Config) -> RegistrySettings {
    RegistrySettings {
        crash_threshold: config.crash_threshold(),
        cooldown: config.cooldown(),
        notification_window: config.notification_window(),
        max_workers: config.max_pooled_workers(),
    }
}
