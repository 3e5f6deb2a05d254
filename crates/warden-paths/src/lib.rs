//! Filesystem-state caches that route lint requests to the right project.
//!
//! Two questions are asked for every document: "which directory owns the
//! nearest package manifest?" and "does this project use Plug'n'Play
//! resolution, and where are its register/loader scripts?". Both are upward
//! directory searches whose answers rarely change, so [`PathStateCache`]
//! memoises the outcome for every directory visited during a search and
//! drops entries precisely when one of the files that decide the answer
//! changes on disk.

pub mod cache;
pub mod key;
pub mod targets;

pub use self::cache::{Lookup, PathStateCache, SearchTarget};
pub use self::key::{PathKey, is_within, normalize};
pub use self::targets::{
    PackageRootCache, PackageRootTarget, PnpCache, PnpConfig, PnpTarget, is_manifest_trigger,
    is_pnp_trigger,
};
