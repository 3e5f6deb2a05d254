//! Keys that decide which pooled worker serves a request.

use camino::{Utf8Path, Utf8PathBuf};
use warden_paths::{PathKey, PnpConfig, is_within};

/// The project a worker is dedicated to.
///
/// Two requests share a worker exactly when their identities are equal
/// after path normalisation.
#[derive(Debug, Clone)]
pub struct ProjectIdentity {
    workspace_root: Utf8PathBuf,
    worker_root: Utf8PathBuf,
    pnp: Option<PnpConfig>,
}

impl ProjectIdentity {
    /// Builds an identity for a worker started in `worker_root`.
    #[must_use]
    pub fn new(
        workspace_root: impl Into<Utf8PathBuf>,
        worker_root: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            worker_root: worker_root.into(),
            pnp: None,
        }
    }

    /// Attaches the project's Plug'n'Play configuration.
    #[must_use]
    pub fn with_pnp(mut self, pnp: Option<PnpConfig>) -> Self {
        self.pnp = pnp;
        self
    }

    /// Workspace folder the project belongs to.
    #[must_use]
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Directory the worker subprocess runs in.
    #[must_use]
    pub fn worker_root(&self) -> &Utf8Path {
        &self.worker_root
    }

    /// Plug'n'Play configuration, when the project uses it.
    #[must_use]
    pub const fn pnp(&self) -> Option<&PnpConfig> {
        self.pnp.as_ref()
    }

    /// Normalised pooling key.
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            workspace_root: PathKey::new(&self.workspace_root),
            worker_root: PathKey::new(&self.worker_root),
            pnp_register: self.pnp.as_ref().map(|pnp| PathKey::new(pnp.register())),
            pnp_loader: self
                .pnp
                .as_ref()
                .and_then(PnpConfig::loader)
                .map(PathKey::new),
        }
    }

    /// Returns `true` when `path` lies within the worker or workspace root.
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        is_within(path, &self.worker_root) || is_within(path, &self.workspace_root)
    }
}

/// Normalised form of a [`ProjectIdentity`] used as a pool key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    workspace_root: PathKey,
    worker_root: PathKey,
    pnp_register: Option<PathKey>,
    pnp_loader: Option<PathKey>,
}

/// A worker request's routing information.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Project the request belongs to.
    pub identity: ProjectIdentity,
    /// Fingerprint of the files that shape the worker's environment.
    ///
    /// A change replaces the pooled worker.
    pub environment_key: Option<String>,
}

impl WorkerContext {
    /// Builds a context without an environment fingerprint.
    #[must_use]
    pub const fn new(identity: ProjectIdentity) -> Self {
        Self {
            identity,
            environment_key: None,
        }
    }

    /// Attaches an environment fingerprint.
    #[must_use]
    pub fn with_environment_key(mut self, key: impl Into<String>) -> Self {
        self.environment_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn equal_roots_share_a_key() {
        let first = ProjectIdentity::new("/ws", "/ws/pkg/");
        let second = ProjectIdentity::new("/ws/.", "/ws/pkg");
        assert_eq!(first.key(), second.key());
    }

    #[rstest]
    fn pnp_configuration_distinguishes_keys() {
        let plain = ProjectIdentity::new("/ws", "/ws");
        let pnp = ProjectIdentity::new("/ws", "/ws")
            .with_pnp(Some(PnpConfig::new("/ws", "/ws/.pnp.cjs", None)));
        assert_ne!(plain.key(), pnp.key());
    }

    #[rstest]
    #[case("/ws/pkg/a.css", true)]
    #[case("/ws/other/b.css", true)]
    #[case("/elsewhere/c.css", false)]
    #[case("/ws-two/d.css", false)]
    fn containment_covers_both_roots(#[case] path: &str, #[case] expected: bool) {
        let identity = ProjectIdentity::new("/ws", "/ws/pkg");
        assert_eq!(identity.contains(Utf8Path::new(path)), expected);
    }
}
