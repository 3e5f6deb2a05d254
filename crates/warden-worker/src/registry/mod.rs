//! Pool of worker processes guarded by a per-project circuit breaker.

mod clock;
mod health;


use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use camino::Utf8Path;
use lru::LruCache;
use tracing::{debug, info, warn};
use warden_paths::is_within;

#[cfg(any(test, feature = "test-support"))]
pub use self::clock::ManualClock;
pub use self::clock::{Clock, SystemClock};
pub use self::health::HealthState;
use crate::error::WorkerError;
use crate::identity::{IdentityKey, ProjectIdentity, WorkerContext};
use crate::process::WorkerProcess;
use crate::settings::{RegistrySettings, WorkerSettings};

/// Tracing target for pooling and circuit-breaker decisions.
pub(crate) const REGISTRY_TARGET: &str = "warden_worker::registry";

struct WorkerRecord {
    identity: ProjectIdentity,
    process: Arc<WorkerProcess>,
    environment_key: Option<String>,
    health: HealthState,
    /// Callers currently running an executor against this record.
    active: usize,
}

impl WorkerRecord {
    const fn is_idle(&self) -> bool {
        self.active == 0
    }

    /// Idle and healthy records go first; records in cooldown are kept so
    /// their breaker survives the pool cap.
    fn eviction_rank(&self) -> Option<u8> {
        if !self.is_idle() || self.health.cooldown_expires_at.is_some() {
            None
        } else if self.health.is_healthy() {
            Some(0)
        } else {
            Some(1)
        }
    }
}

/// Hands out pooled [`WorkerProcess`]es and tracks their crash history.
#[derive(Debug)]
pub struct WorkerRegistry {
    settings: RegistrySettings,
    worker_settings: WorkerSettings,
    clock: Arc<dyn Clock>,
    pool: Mutex<LruCache<IdentityKey, WorkerRecord>>,
}

impl std::fmt::Debug for WorkerRecord {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WorkerRecord")
            .field("identity", &self.identity)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl WorkerRegistry {
    /// Creates an empty registry using the system clock.
    #[must_use]
    pub fn new(settings: RegistrySettings, worker_settings: WorkerSettings) -> Self {
        Self::with_clock(settings, worker_settings, Arc::new(SystemClock))
    }

    /// Creates an empty registry reading time from `clock`.
    #[must_use]
    pub fn with_clock(
        settings: RegistrySettings,
        worker_settings: WorkerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            worker_settings,
            clock,
            pool: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Circuit-breaker and pooling policy in force.
    #[must_use]
    pub const fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Runs `executor` against the worker for `context`.
    ///
    /// The worker is created on first use and replaced when its
    /// environment fingerprint changes or it has been disposed. While the
    /// project's breaker is open the executor is not invoked and
    /// [`WorkerError::Unavailable`] is returned instead. The executor's
    /// outcome is returned unchanged; crashes count towards the breaker and
    /// successes reset it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Unavailable`] during cooldown, otherwise
    /// whatever the executor returns.
    pub fn run_with_worker<T, F>(
        &self,
        context: &WorkerContext,
        executor: F,
    ) -> Result<T, WorkerError>
    where
        F: FnOnce(&WorkerProcess) -> Result<T, WorkerError>,
    {
        let key = context.identity.key();
        let process = self.checkout(context, &key)?;
        let outcome = executor(&process);
        self.record_outcome(&key, &process, outcome.as_ref().err());
        outcome
    }

    /// Releases the breaker for workers belonging to `workspace_root`.
    ///
    /// Returns how many workers were released.
    pub fn notify_workspace_activity(&self, workspace_root: &Utf8Path) -> usize {
        self.release_matching(|identity| is_within(identity.workspace_root(), workspace_root))
    }

    /// Releases the breaker for workers whose project contains `path`.
    ///
    /// Returns how many workers were released.
    pub fn notify_file_activity(&self, path: &Utf8Path) -> usize {
        self.release_matching(|identity| identity.contains(path))
    }

    /// Disposes and forgets the workers belonging to `workspace_root`.
    pub fn dispose(&self, workspace_root: &Utf8Path) -> usize {
        let removed: Vec<WorkerRecord> = {
            let mut pool = self.lock();
            let keys: Vec<IdentityKey> = pool
                .iter()
                .filter(|(_, record)| is_within(record.identity.workspace_root(), workspace_root))
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| pool.pop(key)).collect()
        };
        let count = removed.len();
        retire(removed.into_iter().map(|record| record.process));
        if count > 0 {
            info!(
                target: REGISTRY_TARGET,
                workspace_root = %workspace_root,
                count,
                "disposed workspace workers"
            );
        }
        count
    }

    /// Disposes every pooled worker.
    pub fn dispose_all(&self) {
        let drained: Vec<Arc<WorkerProcess>> = {
            let mut pool = self.lock();
            let mut drained = Vec::with_capacity(pool.len());
            while let Some((_, record)) = pool.pop_lru() {
                drained.push(record.process);
            }
            drained
        };
        retire(drained);
    }

    /// Crash history of the worker for `identity`, if pooled.
    #[must_use]
    pub fn health(&self, identity: &ProjectIdentity) -> Option<HealthState> {
        self.lock()
            .peek(&identity.key())
            .map(|record| record.health.clone())
    }

    /// The pooled worker for `identity`, if any.
    #[must_use]
    pub fn worker(&self, identity: &ProjectIdentity) -> Option<Arc<WorkerProcess>> {
        self.lock()
            .peek(&identity.key())
            .map(|record| Arc::clone(&record.process))
    }

    /// Number of pooled workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no worker is pooled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<IdentityKey, WorkerRecord>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_process(&self, identity: &ProjectIdentity) -> Arc<WorkerProcess> {
        Arc::new(WorkerProcess::new(
            identity.clone(),
            self.worker_settings.clone(),
        ))
    }

    fn checkout(
        &self,
        context: &WorkerContext,
        key: &IdentityKey,
    ) -> Result<Arc<WorkerProcess>, WorkerError> {
        let now = self.clock.now();
        let mut retired = Vec::new();
        let outcome = {
            let mut pool = self.lock();
            if !pool.contains(key) {
                retired.extend(self.evict_least_recent(&mut pool));
            }
            let record = pool.get_or_insert_mut(key.clone(), || WorkerRecord {
                identity: context.identity.clone(),
                process: self.new_process(&context.identity),
                environment_key: context.environment_key.clone(),
                health: HealthState::default(),
                active: 0,
            });
            self.prepare(record, context, now, &mut retired)
        };
        retire(retired);
        outcome
    }

    /// Applies replacement and cooldown rules to a pooled record.
    fn prepare(
        &self,
        record: &mut WorkerRecord,
        context: &WorkerContext,
        now: Instant,
        retired: &mut Vec<Arc<WorkerProcess>>,
    ) -> Result<Arc<WorkerProcess>, WorkerError> {
        let drifted = match (&record.environment_key, &context.environment_key) {
            (Some(previous), Some(current)) => previous != current,
            _ => false,
        };
        if drifted || record.process.is_disposed() {
            info!(
                target: REGISTRY_TARGET,
                worker_root = %record.identity.worker_root(),
                environment_changed = drifted,
                "replacing worker"
            );
            let fresh = self.new_process(&record.identity);
            retired.push(std::mem::replace(&mut record.process, fresh));
            record.health.reset();
        }
        if context.environment_key.is_some() {
            record.environment_key.clone_from(&context.environment_key);
        }

        if record.health.cooldown_expires_at.is_some() {
            if let Some(retry_in) = record.health.remaining_cooldown(now) {
                let notify_user = record
                    .health
                    .claim_notification(now, self.settings.notification_window);
                debug!(
                    target: REGISTRY_TARGET,
                    worker_root = %record.identity.worker_root(),
                    retry_in_ms = retry_in.as_millis(),
                    notify_user,
                    "worker unavailable"
                );
                return Err(WorkerError::Unavailable {
                    worker_root: record.identity.worker_root().to_owned(),
                    retry_in,
                    notify_user,
                    last_crash: record.health.last_crash_error.clone(),
                });
            }
            info!(
                target: REGISTRY_TARGET,
                worker_root = %record.identity.worker_root(),
                "cooldown expired"
            );
            record.health.reset();
        }

        record.active += 1;
        Ok(Arc::clone(&record.process))
    }

    fn record_outcome(
        &self,
        key: &IdentityKey,
        process: &Arc<WorkerProcess>,
        error: Option<&WorkerError>,
    ) {
        let now = self.clock.now();
        let mut pool = self.lock();
        let Some(record) = pool.peek_mut(key) else {
            return;
        };
        record.active = record.active.saturating_sub(1);
        if !Arc::ptr_eq(&record.process, process) {
            return;
        }
        match error {
            None => {
                if !record.health.is_healthy() {
                    debug!(
                        target: REGISTRY_TARGET,
                        worker_root = %record.identity.worker_root(),
                        "worker recovered"
                    );
                }
                record.health.reset();
            }
            Some(error) if error.is_crash() => {
                let opened = record.health.record_crash(
                    now,
                    error.to_string(),
                    self.settings.crash_threshold,
                    self.settings.cooldown,
                );
                if opened {
                    warn!(
                        target: REGISTRY_TARGET,
                        worker_root = %record.identity.worker_root(),
                        crashes = record.health.consecutive_crashes,
                        cooldown_ms = self.settings.cooldown.as_millis(),
                        error = %error,
                        "worker crashed repeatedly; pausing"
                    );
                } else {
                    warn!(
                        target: REGISTRY_TARGET,
                        worker_root = %record.identity.worker_root(),
                        crashes = record.health.consecutive_crashes,
                        error = %error,
                        "worker crashed"
                    );
                }
            }
            Some(_) => {}
        }
    }

    fn release_matching(&self, matches: impl Fn(&ProjectIdentity) -> bool) -> usize {
        let mut released = 0;
        for (_, record) in self.lock().iter_mut() {
            if record.health.is_healthy() || !matches(&record.identity) {
                continue;
            }
            record.health.reset();
            released += 1;
            info!(
                target: REGISTRY_TARGET,
                worker_root = %record.identity.worker_root(),
                "activity released worker"
            );
        }
        released
    }

    /// Makes room for a new record once the pool is at capacity.
    ///
    /// Busy records and records in cooldown are never evicted, so the pool
    /// may exceed `max_workers` until one of them becomes evictable.
    fn evict_least_recent(
        &self,
        pool: &mut LruCache<IdentityKey, WorkerRecord>,
    ) -> Option<Arc<WorkerProcess>> {
        if pool.len() < self.settings.max_workers.max(1) {
            return None;
        }
        let candidate = pool
            .iter()
            .rev()
            .filter_map(|(key, record)| record.eviction_rank().map(|rank| (rank, key)))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, key)| key.clone());
        let Some(key) = candidate else {
            debug!(
                target: REGISTRY_TARGET,
                pooled = pool.len(),
                "no idle worker to evict; pool over capacity"
            );
            return None;
        };
        let record = pool.pop(&key)?;
        debug!(
            target: REGISTRY_TARGET,
            worker_root = %record.identity.worker_root(),
            "evicting least recently used worker"
        );
        Some(record.process)
    }
}

impl Drop for WorkerRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

/// Disposes processes outside the pool lock.
fn retire(processes: impl IntoIterator<Item = Arc<WorkerProcess>>) {
    for process in processes {
        process.dispose();
    }
}
