//! Generic memoising upward directory search.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::key::{PathKey, normalize};

/// Log target for cache operations.
const CACHE_TARGET: &str = "warden_paths::cache";

/// What a [`PathStateCache`] searches for.
pub trait SearchTarget {
    /// Outcome stored for a directory when the search succeeds.
    type Value: Clone + fmt::Debug;

    /// Short label used in logs.
    fn label(&self) -> &'static str;

    /// Checks a single directory.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while inspecting `dir`. The cache logs it
    /// and keeps walking upwards.
    fn probe(&self, dir: &Utf8Path) -> io::Result<Option<Self::Value>>;

    /// Returns `true` when a change to a file with this name can alter the
    /// outcome of a search.
    fn is_trigger(&self, file_name: &str) -> bool;

    /// Directory the value was found in.
    fn anchor<'a>(&self, value: &'a Self::Value) -> &'a Utf8Path;
}

/// Cached knowledge about one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// The directory has not been searched.
    Unknown,
    /// A search ran and found nothing up to the filesystem root.
    NotFound,
    /// A search ran and found this value.
    Found(V),
}

#[derive(Debug, Clone)]
enum CacheEntry<V> {
    NotFound,
    Found(V),
}

impl<V: Clone> CacheEntry<V> {
    fn from_outcome(outcome: Option<&V>) -> Self {
        outcome.map_or(Self::NotFound, |value| Self::Found(value.clone()))
    }

    fn to_outcome(&self) -> Option<V> {
        match self {
            Self::NotFound => None,
            Self::Found(value) => Some(value.clone()),
        }
    }
}

/// Upward-search cache keyed by normalised directory path.
///
/// Every directory visited by [`find`](Self::find) is written back pointing
/// at the same outcome, positive or negative, so a later search that starts
/// in any of them is answered without touching the filesystem.
#[derive(Debug)]
pub struct PathStateCache<T: SearchTarget> {
    target: T,
    entries: Mutex<HashMap<PathKey, CacheEntry<T::Value>>>,
}

impl<T: SearchTarget> PathStateCache<T> {
    /// Creates an empty cache for `target`.
    #[must_use]
    pub fn new(target: T) -> Self {
        Self {
            target,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the search target.
    #[must_use]
    pub const fn target(&self) -> &T {
        &self.target
    }

    /// Finds the nearest value at or above `start_dir`.
    pub fn find(&self, start_dir: &Utf8Path) -> Option<T::Value> {
        let mut visited = Vec::new();
        let mut current: Option<Utf8PathBuf> = Some(normalize(start_dir));

        let outcome = loop {
            let Some(dir) = current.take() else {
                break None;
            };
            let key = PathKey::new(&dir);

            if let Some(entry) = self.lock().get(&key) {
                break entry.to_outcome();
            }

            match self.target.probe(&dir) {
                Ok(Some(value)) => {
                    visited.push(key);
                    break Some(value);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        target: CACHE_TARGET,
                        search = self.target.label(),
                        dir = %dir,
                        %error,
                        "probe failed, continuing with parent"
                    );
                }
            }

            visited.push(key);
            current = dir.parent().map(Utf8Path::to_path_buf);
        };

        if !visited.is_empty() {
            debug!(
                target: CACHE_TARGET,
                search = self.target.label(),
                start = %start_dir,
                visited = visited.len(),
                found = outcome.is_some(),
                "memoised upward search"
            );
            let mut entries = self.lock();
            for key in visited {
                entries.insert(key, CacheEntry::from_outcome(outcome.as_ref()));
            }
        }

        outcome
    }

    /// Returns what is cached for `dir` without searching.
    #[must_use]
    pub fn lookup(&self, dir: &Utf8Path) -> Lookup<T::Value> {
        match self.lock().get(&PathKey::new(dir)) {
            None => Lookup::Unknown,
            Some(CacheEntry::NotFound) => Lookup::NotFound,
            Some(CacheEntry::Found(value)) => Lookup::Found(value.clone()),
        }
    }

    /// Drops entries that a change to `path` may have invalidated.
    ///
    /// Only files the target recognises as triggers have any effect. Every
    /// entry whose directory, or whose resolved anchor, lies within the
    /// changed file's directory is removed. Returns the number of entries
    /// removed.
    pub fn invalidate_for_file(&self, path: &Utf8Path) -> usize {
        let Some(file_name) = path.file_name() else {
            return 0;
        };
        if !self.target.is_trigger(file_name) {
            return 0;
        }
        let Some(container) = path.parent() else {
            return 0;
        };
        let container_key = PathKey::new(container);

        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            if key.is_within(&container_key) {
                return false;
            }
            match entry {
                CacheEntry::Found(value) => {
                    !PathKey::new(self.target.anchor(value)).is_within(&container_key)
                }
                CacheEntry::NotFound => true,
            }
        });
        let removed = before.saturating_sub(entries.len());

        debug!(
            target: CACHE_TARGET,
            search = self.target.label(),
            file = %path,
            removed,
            "invalidated entries for changed file"
        );
        removed
    }

    /// Drops every entry at or beneath `root`.
    pub fn clear_for_workspace(&self, root: &Utf8Path) {
        let root_key = PathKey::new(root);
        self.lock().retain(|key, _| !key.is_within(&root_key));
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathKey, CacheEntry<T::Value>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
