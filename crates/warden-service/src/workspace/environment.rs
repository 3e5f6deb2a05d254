//! Fingerprint of the files that decide what a worker would load.

use std::io;
use std::time::UNIX_EPOCH;

use camino::Utf8Path;
use sha2::{Digest, Sha256};

/// Files in a worker root whose edits change engine resolution.
const ENVIRONMENT_FILES: [&str; 8] = [
    "package.json",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    ".pnp.cjs",
    ".pnp.js",
    ".pnp.loader.mjs",
];

const MISSING: &[u8] = b"-";

/// Hashes the modification stamps of the environment files under
/// `worker_root`, plus `engine_path` when one is configured.
///
/// Two calls return the same key until one of those files is created,
/// removed, or rewritten.
pub(crate) fn environment_key(worker_root: &Utf8Path, engine_path: Option<&Utf8Path>) -> String {
    let mut hasher = Sha256::new();
    for name in ENVIRONMENT_FILES {
        hasher.update(name.as_bytes());
        hasher.update(stamp(&worker_root.join(name)));
    }
    if let Some(path) = engine_path {
        hasher.update(path.as_str().as_bytes());
        hasher.update(stamp(path));
    }
    format!("{:x}", hasher.finalize())
}

fn stamp(path: &Utf8Path) -> Vec<u8> {
    read_stamp(path).unwrap_or_else(|_| MISSING.to_vec())
}

fn read_stamp(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let metadata = path.metadata()?;
    let modified = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    Ok(format!("{modified}:{}", metadata.len()).into_bytes())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn project() -> (TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
        fs::write(root.join("package.json"), "{}").expect("write manifest");
        (dir, root)
    }

    #[rstest]
    fn key_is_stable_without_changes(project: (TempDir, Utf8PathBuf)) {
        let (_dir, root) = project;

        assert_eq!(environment_key(&root, None), environment_key(&root, None));
    }

    #[rstest]
    fn new_lockfile_changes_the_key(project: (TempDir, Utf8PathBuf)) {
        let (_dir, root) = project;
        let before = environment_key(&root, None);

        fs::write(root.join("yarn.lock"), "# lock").expect("write lockfile");

        assert_ne!(before, environment_key(&root, None));
    }

    #[rstest]
    fn engine_path_takes_part_in_the_key(project: (TempDir, Utf8PathBuf)) {
        let (_dir, root) = project;
        let engine = root.join("engine.js");

        assert_ne!(
            environment_key(&root, None),
            environment_key(&root, Some(&engine))
        );
    }
}
