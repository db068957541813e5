//! Compiled-artifact caching.
//!
//! The transpiler itself is pure; this crate lets collaborators (the CLI, a
//! view engine) skip recompilation when nothing changed. Entries are keyed
//! by a caller-chosen key and validated against:
//!
//! - a **fingerprint** of the flag set the artifact was compiled with,
//! - the artifact's recorded **dependency snapshot** (`path → mtime`), and
//! - the **cache version** (one per crate release).
//!
//! Two implementations: [`NullArtifactCache`] (always miss, caching
//! disabled) and [`FileArtifactCache`] (scripts and JSON metadata under a
//! cache directory).
//!
//! # Example
//!
//! ```
//! use plume_cache::{ArtifactCache, NullArtifactCache};
//! use plume_compiler::DependencyMap;
//!
//! let cache = NullArtifactCache;
//! cache.set("views/page", "fp", "script text", &DependencyMap::new());
//! assert!(cache.get("views/page", "fp").is_none()); // always misses
//! ```

mod file;

pub use file::FileArtifactCache;

use plume_compiler::{CompileOptions, DependencyMap};
use serde::{Deserialize, Serialize};

/// Metadata stored alongside a cached artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedMeta {
    /// Fingerprint of the compile flags the artifact was built with.
    pub fingerprint: String,
    /// Dependency snapshot: source path to mtime, in seconds since the
    /// Unix epoch.
    pub dependencies: std::collections::BTreeMap<std::path::PathBuf, f64>,
    /// Cache format/crate version for wholesale invalidation on upgrade.
    pub cache_version: String,
}

/// A cache hit.
#[derive(Clone, Debug)]
pub struct CachedArtifact {
    /// The compiled host script.
    pub script: String,
    /// The metadata the entry was validated against.
    pub meta: CachedMeta,
}

/// Store for compiled artifacts.
///
/// An entry is valid only while its fingerprint matches **and** every
/// recorded dependency still exists with an unchanged mtime.
pub trait ArtifactCache: Send + Sync {
    /// Retrieve a cached artifact if still valid.
    fn get(&self, key: &str, fingerprint: &str) -> Option<CachedArtifact>;

    /// Store an artifact with its dependency snapshot.
    fn set(&self, key: &str, fingerprint: &str, script: &str, dependencies: &DependencyMap);

    /// Drop an entry.
    fn invalidate(&self, key: &str);
}

/// No-op cache used when caching is disabled.
///
/// Every `get` misses; every `set` is discarded.
#[derive(Debug, Default)]
pub struct NullArtifactCache;

impl ArtifactCache for NullArtifactCache {
    fn get(&self, _key: &str, _fingerprint: &str) -> Option<CachedArtifact> {
        None
    }

    fn set(&self, _key: &str, _fingerprint: &str, _script: &str, _dependencies: &DependencyMap) {}

    fn invalidate(&self, _key: &str) {}
}

/// Stable fingerprint of a flag set.
///
/// Two option values produce the same fingerprint iff every cache-relevant
/// flag matches, so cache keys honor `(root, flags, deps)`.
#[must_use]
pub fn fingerprint(options: &CompileOptions) -> String {
    format!(
        "ext={};base={};props={};void={};cont={};kebab={}",
        options.extension,
        options
            .base_dir
            .as_ref()
            .map_or_else(String::new, |p| p.display().to_string()),
        options.properties,
        options.void_self_close,
        options.container_self_close,
        options.kebab_case,
    )
}

/// Seconds since the Unix epoch for a recorded dependency mtime.
pub(crate) fn mtime_seconds(time: std::time::SystemTime) -> f64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
