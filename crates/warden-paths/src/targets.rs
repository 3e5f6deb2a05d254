//! The two concrete searches: package roots and Plug'n'Play configuration.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::cache::{PathStateCache, SearchTarget};

/// Package manifest marking a project root.
pub const MANIFEST_FILE: &str = "package.json";

/// Files whose changes can move or alter a package root.
const MANIFEST_TRIGGERS: [&str; 5] = [
    MANIFEST_FILE,
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
];

/// Plug'n'Play register script, current and legacy names.
const PNP_REGISTER_FILES: [&str; 2] = [".pnp.cjs", ".pnp.js"];

/// Plug'n'Play ESM loader, present only for projects that need it.
const PNP_LOADER_FILE: &str = ".pnp.loader.mjs";

/// Files whose changes can alter a Plug'n'Play lookup.
const PNP_TRIGGERS: [&str; 5] = [
    ".pnp.cjs",
    ".pnp.js",
    PNP_LOADER_FILE,
    MANIFEST_FILE,
    "yarn.lock",
];

/// Returns `true` when `file_name` can alter a package-root lookup.
#[must_use]
pub fn is_manifest_trigger(file_name: &str) -> bool {
    MANIFEST_TRIGGERS.contains(&file_name)
}

/// Returns `true` when `file_name` can alter a Plug'n'Play lookup.
#[must_use]
pub fn is_pnp_trigger(file_name: &str) -> bool {
    PNP_TRIGGERS.contains(&file_name)
}

fn is_file(path: &Utf8Path) -> io::Result<bool> {
    match path.metadata() {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Finds the nearest directory containing `package.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageRootTarget;

impl SearchTarget for PackageRootTarget {
    type Value = Utf8PathBuf;

    fn label(&self) -> &'static str {
        "package-root"
    }

    fn probe(&self, dir: &Utf8Path) -> io::Result<Option<Utf8PathBuf>> {
        if is_file(&dir.join(MANIFEST_FILE))? {
            return Ok(Some(dir.to_path_buf()));
        }
        Ok(None)
    }

    fn is_trigger(&self, file_name: &str) -> bool {
        is_manifest_trigger(file_name)
    }

    fn anchor<'a>(&self, value: &'a Utf8PathBuf) -> &'a Utf8Path {
        value.as_path()
    }
}

/// Register and loader scripts of a Plug'n'Play project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PnpConfig {
    root: Utf8PathBuf,
    register: Utf8PathBuf,
    loader: Option<Utf8PathBuf>,
}

impl PnpConfig {
    /// Builds a configuration rooted at `root`.
    #[must_use]
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        register: impl Into<Utf8PathBuf>,
        loader: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            register: register.into(),
            loader,
        }
    }

    /// Directory holding the scripts.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.root.as_path()
    }

    /// Absolute path of the register script.
    #[must_use]
    pub fn register(&self) -> &Utf8Path {
        self.register.as_path()
    }

    /// Absolute path of the ESM loader, when present.
    #[must_use]
    pub fn loader(&self) -> Option<&Utf8Path> {
        self.loader.as_deref()
    }
}

/// Finds the nearest directory containing a Plug'n'Play register script.
#[derive(Debug, Clone, Copy, Default)]
pub struct PnpTarget;

impl SearchTarget for PnpTarget {
    type Value = PnpConfig;

    fn label(&self) -> &'static str {
        "pnp"
    }

    fn probe(&self, dir: &Utf8Path) -> io::Result<Option<PnpConfig>> {
        for register_name in PNP_REGISTER_FILES {
            let register = dir.join(register_name);
            if !is_file(&register)? {
                continue;
            }
            let loader_path = dir.join(PNP_LOADER_FILE);
            let loader = is_file(&loader_path)?.then_some(loader_path);
            return Ok(Some(PnpConfig::new(dir, register, loader)));
        }
        Ok(None)
    }

    fn is_trigger(&self, file_name: &str) -> bool {
        is_pnp_trigger(file_name)
    }

    fn anchor<'a>(&self, value: &'a PnpConfig) -> &'a Utf8Path {
        value.root()
    }
}

/// Cache of nearest package roots.
pub type PackageRootCache = PathStateCache<PackageRootTarget>;

/// Cache of Plug'n'Play configurations.
pub type PnpCache = PathStateCache<PnpTarget>;
