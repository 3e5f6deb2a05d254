//! Path normalisation and containment shared by caches and the worker pool.

use std::fmt;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Whether the host filesystem is usually case-insensitive.
const CASE_INSENSITIVE: bool = cfg!(any(windows, target_os = "macos"));

/// Lexically normalises `path`: drops `.` components and folds `..` into
/// their parent without touching the filesystem.
#[must_use]
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if !normalized.pop() && !normalized.has_root() {
                    normalized.push(component.as_str());
                }
            }
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}

/// Comparison key for a directory or file path.
///
/// Keys are lexically normalised and case-folded on case-insensitive
/// platforms, so two spellings of the same directory share one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(String);

impl PathKey {
    /// Builds the key for `path`.
    #[must_use]
    pub fn new(path: &Utf8Path) -> Self {
        let normalized = normalize(path).into_string();
        if CASE_INSENSITIVE {
            Self(normalized.to_lowercase())
        } else {
            Self(normalized)
        }
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns `true` when `self` equals `parent` or lies beneath it.
    ///
    /// `/foo2` is not within `/foo`: a prefix only counts when it ends at a
    /// separator.
    #[must_use]
    pub fn is_within(&self, parent: &Self) -> bool {
        let child = self.0.as_str();
        let base = parent.0.as_str();
        if child == base {
            return true;
        }
        let Some(rest) = child.strip_prefix(base) else {
            return false;
        };
        base.ends_with(std::path::MAIN_SEPARATOR)
            || base.ends_with('/')
            || rest.starts_with(std::path::MAIN_SEPARATOR)
            || rest.starts_with('/')
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Returns `true` when `child` equals `parent` or lies beneath it.
#[must_use]
pub fn is_within(child: &Utf8Path, parent: &Utf8Path) -> bool {
    PathKey::new(child).is_within(&PathKey::new(parent))
}
