//! Locates the engine package for a request.
//!
//! Resolution tries, in order: the explicitly configured path, a local
//! installation above the document (or the worker's directory), and the
//! selected package manager's global modules directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};
use warden_protocol::{PackageManager, ResolutionSource};

use crate::HOST_TARGET;
use crate::command::{CommandSpec, RunOptions, run_command};
use crate::error::EngineError;

const MANIFEST: &str = "package.json";
const NODE_MODULES: &str = "node_modules";

/// Plug'n'Play scripts the worker was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnpScripts {
    /// `.pnp.cjs` / `.pnp.js` register script.
    pub register: PathBuf,
    /// `.pnp.loader.mjs` ESM loader, if present.
    pub loader: Option<PathBuf>,
}

/// External tools consulted during resolution.
pub trait Toolchain {
    /// Global modules directory of `manager`, if it can be determined.
    fn global_modules(&self, manager: PackageManager) -> Option<PathBuf>;

    /// Resolves `request` from `from` through a Plug'n'Play register script.
    fn pnp_resolve(&self, register: &Path, request: &str, from: &Path) -> Option<PathBuf>;
}

/// [`Toolchain`] backed by `node` and the package-manager CLIs.
#[derive(Debug, Clone)]
pub struct NodeToolchain {
    node: PathBuf,
    cwd: PathBuf,
    timeout: Duration,
}

impl NodeToolchain {
    /// Creates a toolchain running `node` from `cwd`.
    #[must_use]
    pub fn new(node: impl Into<PathBuf>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            node: node.into(),
            cwd: cwd.into(),
            timeout,
        }
    }

    fn first_line(&self, spec: &CommandSpec) -> Option<String> {
        let options = RunOptions {
            timeout: self.timeout,
            max_bytes: 64 * 1024,
            stdin: None,
        };
        match run_command(spec, options) {
            Ok(output) if output.status.success() && !output.timed_out => output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_owned),
            Ok(output) => {
                debug!(
                    target: HOST_TARGET,
                    command = %spec,
                    status = ?output.status.code(),
                    timed_out = output.timed_out,
                    "helper command failed"
                );
                None
            }
            Err(error) => {
                debug!(
                    target: HOST_TARGET,
                    command = %spec,
                    error = %error,
                    "helper command unavailable"
                );
                None
            }
        }
    }
}

impl Toolchain for NodeToolchain {
    fn global_modules(&self, manager: PackageManager) -> Option<PathBuf> {
        let spec = match manager {
            PackageManager::Npm => {
                CommandSpec::new(&self.cwd, Path::new("npm")).args(["root", "-g"])
            }
            PackageManager::Pnpm => {
                CommandSpec::new(&self.cwd, Path::new("pnpm")).args(["root", "-g"])
            }
            PackageManager::Yarn => {
                CommandSpec::new(&self.cwd, Path::new("yarn")).args(["global", "dir"])
            }
        };
        let line = self.first_line(&spec)?;
        let root = PathBuf::from(line);
        Some(match manager {
            PackageManager::Yarn => root.join(NODE_MODULES),
            PackageManager::Npm | PackageManager::Pnpm => root,
        })
    }

    fn pnp_resolve(&self, register: &Path, request: &str, from: &Path) -> Option<PathBuf> {
        let script = format!(
            "require.resolve({}, {{ paths: [{}] }})",
            serde_json::to_string(request).ok()?,
            serde_json::to_string(&from.to_string_lossy()).ok()?,
        );
        let spec = CommandSpec::new(&self.cwd, &self.node)
            .arg("--require")
            .arg(register.to_string_lossy())
            .arg("--print")
            .arg(script);
        self.first_line(&spec).map(PathBuf::from)
    }
}

/// What a request asks the resolver to find.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Explicit engine location.
    pub engine_path: Option<PathBuf>,
    /// Document being linted; anchors local resolution.
    pub document_path: Option<PathBuf>,
    /// Package manager whose global directory is the last resort.
    pub package_manager: Option<PackageManager>,
}

/// A located engine installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEngine {
    /// Package directory.
    pub package_dir: PathBuf,
    /// Command-line entry point executed for each lint.
    pub entry: PathBuf,
    /// Declared package version.
    pub version: Option<String>,
    /// Strategy that found it.
    pub source: ResolutionSource,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    bin: Option<BinField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BinField {
    Single(String),
    Named(HashMap<String, String>),
}

/// Finds engine installations; global directories are cached per instance.
#[derive(Debug)]
pub struct EngineResolver<T: Toolchain> {
    package: String,
    cwd: PathBuf,
    pnp: Option<PnpScripts>,
    toolchain: T,
    global_dirs: HashMap<PackageManager, Option<PathBuf>>,
}

impl<T: Toolchain> EngineResolver<T> {
    /// Creates a resolver for `package`, with `cwd` as the worker root.
    #[must_use]
    pub fn new(package: impl Into<String>, cwd: impl Into<PathBuf>, toolchain: T) -> Self {
        Self {
            package: package.into(),
            cwd: cwd.into(),
            pnp: None,
            toolchain,
            global_dirs: HashMap::new(),
        }
    }

    /// Resolves through Plug'n'Play instead of `node_modules`.
    #[must_use]
    pub fn with_pnp(mut self, pnp: Option<PnpScripts>) -> Self {
        self.pnp = pnp;
        self
    }

    /// Package name being resolved.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Plug'n'Play scripts, if the worker uses them.
    #[must_use]
    pub const fn pnp(&self) -> Option<&PnpScripts> {
        self.pnp.as_ref()
    }

    /// Locates the engine for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no strategy succeeds and
    /// [`EngineError::Unusable`] when the package found has no entry point.
    pub fn resolve(&mut self, request: &ResolveRequest) -> Result<ResolvedEngine, EngineError> {
        if let Some(explicit) = request.engine_path.as_deref() {
            return self.resolve_explicit(explicit);
        }
        if let Some(found) = self.resolve_local(request)? {
            return Ok(found);
        }
        let manager = request.package_manager.unwrap_or_default();
        if let Some(found) = self.resolve_global(manager)? {
            return Ok(found);
        }
        Err(EngineError::NotFound {
            package: self.package.clone(),
            detail: format!(
                "no local installation above {} and none in the {manager} global directory",
                self.anchor(request).display()
            ),
        })
    }

    fn anchor(&self, request: &ResolveRequest) -> PathBuf {
        request
            .document_path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| self.cwd.clone(), |dir| self.absolute(dir))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    fn resolve_explicit(&self, configured: &Path) -> Result<ResolvedEngine, EngineError> {
        let path = self.absolute(configured);
        let source = ResolutionSource::Explicit;
        if path.is_dir() {
            return self.load_package(&path, source);
        }
        if path.is_file() {
            if path.file_name().is_some_and(|name| name == MANIFEST) {
                let dir = path.parent().unwrap_or(&path);
                return self.load_package(dir, source);
            }
            let package_dir = nearest_manifest_dir(&path).unwrap_or_else(|| {
                path.parent().map_or_else(|| path.clone(), Path::to_path_buf)
            });
            let version = read_manifest(&package_dir).and_then(|manifest| manifest.version);
            return Ok(ResolvedEngine {
                package_dir,
                entry: path,
                version,
                source,
            });
        }
        Err(EngineError::NotFound {
            package: self.package.clone(),
            detail: format!("configured engine path {} does not exist", path.display()),
        })
    }

    fn resolve_local(
        &self,
        request: &ResolveRequest,
    ) -> Result<Option<ResolvedEngine>, EngineError> {
        let anchor = self.anchor(request);
        let mut starts = vec![anchor];
        if !starts.contains(&self.cwd) {
            starts.push(self.cwd.clone());
        }

        for start in starts {
            if let Some(pnp) = &self.pnp {
                let lookup = format!("{}/{MANIFEST}", self.package);
                if let Some(manifest) = self.toolchain.pnp_resolve(&pnp.register, &lookup, &start)
                {
                    let dir = manifest.parent().map_or_else(|| manifest.clone(), Path::to_path_buf);
                    return self.load_package(&dir, ResolutionSource::Pnp).map(Some);
                }
                continue;
            }
            for dir in start.ancestors() {
                let candidate = dir.join(NODE_MODULES).join(&self.package);
                if candidate.join(MANIFEST).is_file() {
                    return self.load_package(&candidate, ResolutionSource::Local).map(Some);
                }
            }
        }
        Ok(None)
    }

    fn resolve_global(
        &mut self,
        manager: PackageManager,
    ) -> Result<Option<ResolvedEngine>, EngineError> {
        let toolchain = &self.toolchain;
        let root = self
            .global_dirs
            .entry(manager)
            .or_insert_with(|| {
                let root = toolchain.global_modules(manager);
                debug!(target: HOST_TARGET, %manager, root = ?root, "global modules directory");
                root
            })
            .clone();
        let Some(root) = root else {
            return Ok(None);
        };
        let candidate = root.join(&self.package);
        if !candidate.join(MANIFEST).is_file() {
            return Ok(None);
        }
        self.load_package(&candidate, ResolutionSource::Global).map(Some)
    }

    fn load_package(
        &self,
        package_dir: &Path,
        source: ResolutionSource,
    ) -> Result<ResolvedEngine, EngineError> {
        let unusable = |reason: &str| EngineError::Unusable {
            path: package_dir.to_path_buf(),
            reason: reason.to_owned(),
        };
        let manifest = read_manifest(package_dir)
            .ok_or_else(|| unusable("package.json is missing or unreadable"))?;
        if let Some(name) = manifest.name.as_deref() {
            if name != self.package {
                warn!(
                    target: HOST_TARGET,
                    expected = %self.package,
                    found = name,
                    path = %package_dir.display(),
                    "engine package name differs from the configured package"
                );
            }
        }
        let bin = match manifest.bin {
            Some(BinField::Single(bin)) => Some(bin),
            Some(BinField::Named(mut bins)) => {
                let preferred = manifest
                    .name
                    .as_deref()
                    .and_then(|name| bins.remove(name))
                    .or_else(|| bins.remove(&self.package));
                preferred.or_else(|| {
                    let mut rest: Vec<(String, String)> = bins.into_iter().collect();
                    rest.sort();
                    rest.into_iter().next().map(|(_, bin)| bin)
                })
            }
            None => None,
        };
        let entry = bin
            .map(|bin| package_dir.join(bin))
            .ok_or_else(|| unusable("package declares no command-line entry point"))?;
        if !entry.is_file() {
            return Err(unusable("command-line entry point is missing"));
        }
        Ok(ResolvedEngine {
            package_dir: package_dir.to_path_buf(),
            entry,
            version: manifest.version,
            source,
        })
    }
}

fn read_manifest(dir: &Path) -> Option<Manifest> {
    let text = fs::read_to_string(dir.join(MANIFEST)).ok()?;
    serde_json::from_str(&text).ok()
}

fn nearest_manifest_dir(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .skip(1)
        .find(|dir| dir.join(MANIFEST).is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests;
