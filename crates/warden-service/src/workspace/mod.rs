//! Routes documents to the worker that owns their project.
//!
//! Each request is turned into a [`ProjectIdentity`] by consulting the
//! path-state caches: the Plug'n'Play configuration governing the document's
//! directory and the package root the worker should start in. The registry
//! then runs the request on that project's worker. Failures that describe
//! an expected absence (no engine installed, a paused project that has
//! already been reported) come back as `Ok(None)` so callers can treat them
//! as "nothing to show".

mod environment;

#[cfg(test)]
mod tests;

use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};
use warden_config::Config;
use warden_paths::{PackageRootCache, PackageRootTarget, PnpCache, PnpTarget, normalize};
use warden_protocol::{LintPayload, LintResult, ResolvePayload, ResolveResult};
use warden_worker::{ProjectIdentity, WorkerContext, WorkerError, WorkerRegistry};

use self::environment::environment_key;
use crate::error::ServiceError;
use crate::runner::LintDispatch;
use crate::settings::{registry_settings, worker_settings};

/// Tracing target for routing decisions.
const WORKSPACE_TARGET: &str = "warden_service::workspace";

/// How a watched file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// The file was created.
    Created,
    /// The file was modified.
    Changed,
    /// The file was deleted.
    Deleted,
}

/// One entry of a watched-files notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Absolute path of the file.
    pub path: Utf8PathBuf,
    /// Kind of change.
    pub kind: FileChangeKind,
}

impl FileChange {
    /// Builds a change record.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Owns the path-state caches and the worker pool.
#[derive(Debug)]
pub struct WorkspaceService {
    package_roots: PackageRootCache,
    pnp: PnpCache,
    registry: WorkerRegistry,
}

impl WorkspaceService {
    /// Builds a service around an existing registry.
    #[must_use]
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            package_roots: PackageRootCache::new(PackageRootTarget),
            pnp: PnpCache::new(PnpTarget),
            registry,
        }
    }

    /// Builds a service whose workers are launched as configured.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(WorkerRegistry::new(
            registry_settings(config),
            worker_settings(config),
        ))
    }

    /// Returns the worker pool.
    #[must_use]
    pub const fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Lints `document` on its project's worker.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] for worker failures other than a missing
    /// engine or an already-reported cooldown.
    pub fn lint(
        &self,
        workspace_root: &Utf8Path,
        document: &Utf8Path,
        payload: &LintPayload,
    ) -> Result<Option<LintResult>, ServiceError> {
        let engine_path = absolute_engine_path(workspace_root, payload.engine_path.as_deref())?;
        let context = self.context_for(workspace_root, document, engine_path.as_deref());
        let payload = LintPayload {
            engine_path: engine_path.map(Utf8PathBuf::into_std_path_buf),
            ..payload.clone()
        };
        let outcome = self
            .registry
            .run_with_worker(&context, |worker| worker.lint(&payload));
        classify(&context, outcome)
    }

    /// Asks the project's worker which engine it would use for `document`.
    ///
    /// # Errors
    ///
    /// As for [`lint`](Self::lint).
    pub fn resolve(
        &self,
        workspace_root: &Utf8Path,
        document: &Utf8Path,
        payload: &ResolvePayload,
    ) -> Result<Option<ResolveResult>, ServiceError> {
        let engine_path = absolute_engine_path(workspace_root, payload.engine_path.as_deref())?;
        let context = self.context_for(workspace_root, document, engine_path.as_deref());
        let payload = ResolvePayload {
            engine_path: engine_path.map(Utf8PathBuf::into_std_path_buf),
            document_path: Some(
                payload
                    .document_path
                    .clone()
                    .unwrap_or_else(|| document.as_std_path().to_path_buf()),
            ),
            ..payload.clone()
        };
        let outcome = self
            .registry
            .run_with_worker(&context, |worker| worker.resolve(&payload));
        classify(&context, outcome).map(Option::flatten)
    }

    /// Computes the worker identity for `document`.
    #[must_use]
    pub fn context_for(
        &self,
        workspace_root: &Utf8Path,
        document: &Utf8Path,
        engine_path: Option<&Utf8Path>,
    ) -> WorkerContext {
        let workspace_root = normalize(workspace_root);
        let document_dir = document
            .parent()
            .map_or_else(|| workspace_root.clone(), normalize);
        let pnp = self.pnp.find(&document_dir);

        let worker_root = engine_path
            .and_then(|path| self.engine_package_root(path))
            .or_else(|| self.package_roots.find(&document_dir))
            .unwrap_or_else(|| workspace_root.clone());
        debug!(
            target: WORKSPACE_TARGET,
            document = %document,
            worker_root = %worker_root,
            pnp = pnp.is_some(),
            "routed document"
        );

        let key = environment_key(&worker_root, engine_path);
        WorkerContext::new(ProjectIdentity::new(workspace_root, worker_root).with_pnp(pnp))
            .with_environment_key(key)
    }

    fn engine_package_root(&self, engine_path: &Utf8Path) -> Option<Utf8PathBuf> {
        let start = if engine_path.is_dir() {
            engine_path
        } else {
            engine_path.parent()?
        };
        self.package_roots.find(start)
    }

    /// Applies a batch of watched-file events.
    ///
    /// Cache entries decided by the changed files are dropped and paused
    /// projects containing them are released.
    pub fn handle_watched_files_changed(&self, changes: &[FileChange]) {
        for change in changes {
            let roots = self.package_roots.invalidate_for_file(&change.path);
            let pnp = self.pnp.invalidate_for_file(&change.path);
            let released = self.registry.notify_file_activity(&change.path);
            debug!(
                target: WORKSPACE_TARGET,
                path = %change.path,
                kind = ?change.kind,
                roots,
                pnp,
                released,
                "applied file change"
            );
        }
    }

    /// Records that the user opened `path`.
    pub fn handle_document_opened(&self, path: &Utf8Path) {
        self.registry.notify_file_activity(path);
    }

    /// Records activity anywhere inside `workspace_root`.
    pub fn handle_workspace_activity(&self, workspace_root: &Utf8Path) {
        self.registry.notify_workspace_activity(workspace_root);
    }

    /// Forgets a workspace folder: its workers and cached lookups.
    pub fn dispose_workspace(&self, workspace_root: &Utf8Path) -> usize {
        self.package_roots.clear_for_workspace(workspace_root);
        self.pnp.clear_for_workspace(workspace_root);
        self.registry.dispose(workspace_root)
    }

    /// Disposes every worker and empties both caches.
    pub fn shutdown(&self) {
        self.registry.dispose_all();
        self.package_roots.clear();
        self.pnp.clear();
    }
}

impl LintDispatch for WorkspaceService {
    fn lint(
        &self,
        workspace_root: &Utf8Path,
        document: &Utf8Path,
        payload: &LintPayload,
    ) -> Result<Option<LintResult>, ServiceError> {
        Self::lint(self, workspace_root, document, payload)
    }

    fn resolve(
        &self,
        workspace_root: &Utf8Path,
        document: &Utf8Path,
        payload: &ResolvePayload,
    ) -> Result<Option<ResolveResult>, ServiceError> {
        Self::resolve(self, workspace_root, document, payload)
    }
}

fn absolute_engine_path(
    workspace_root: &Utf8Path,
    engine_path: Option<&Path>,
) -> Result<Option<Utf8PathBuf>, ServiceError> {
    let Some(path) = engine_path else {
        return Ok(None);
    };
    let path = Utf8Path::from_path(path).ok_or_else(|| ServiceError::NonUtf8Path {
        path: path.to_path_buf(),
    })?;
    Ok(Some(normalize(&workspace_root.join(path))))
}

fn classify<T>(
    context: &WorkerContext,
    outcome: Result<T, WorkerError>,
) -> Result<Option<T>, ServiceError> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(WorkerError::NotFound { message }) => {
            debug!(
                target: WORKSPACE_TARGET,
                worker_root = %context.identity.worker_root(),
                %message,
                "engine not found"
            );
            Ok(None)
        }
        Err(error @ WorkerError::Unavailable { notify_user: true, .. }) => {
            warn!(
                target: WORKSPACE_TARGET,
                worker_root = %context.identity.worker_root(),
                %error,
                "worker unavailable"
            );
            Err(error.into())
        }
        Err(WorkerError::Unavailable { .. }) => Ok(None),
        Err(error) => Err(error.into()),
    }
}
