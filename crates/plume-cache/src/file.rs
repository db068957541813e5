//! File-based artifact cache.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use plume_compiler::DependencyMap;

use crate::{ArtifactCache, CachedArtifact, CachedMeta, mtime_seconds};

/// Mtime comparison tolerance, absorbing JSON float round-tripping.
const MTIME_TOLERANCE: f64 = 0.001;

/// File-based artifact cache.
///
/// Layout:
/// ```text
/// {root}/
/// ├── scripts/
/// │   └── {key}.ps1    # compiled artifact
/// └── meta/
///     └── {key}.json   # fingerprint, dependency snapshot, version
/// ```
///
/// An entry is served only when the stored fingerprint and cache version
/// match and every recorded dependency still has its recorded mtime; any
/// transitive template change therefore invalidates the artifact.
#[derive(Debug)]
pub struct FileArtifactCache {
    scripts_dir: PathBuf,
    meta_dir: PathBuf,
    version: String,
}

impl FileArtifactCache {
    /// Create a cache rooted at `root` (e.g. `.plume/cache/`).
    #[must_use]
    pub fn new(root: &Path, version: impl Into<String>) -> Self {
        Self {
            scripts_dir: root.join("scripts"),
            meta_dir: root.join("meta"),
            version: version.into(),
        }
    }

    fn read_meta(&self, meta_path: &Path) -> Option<CachedMeta> {
        let content = fs::read_to_string(meta_path).ok()?;
        let meta: CachedMeta = serde_json::from_str(&content).ok()?;
        if meta.cache_version != self.version {
            return None;
        }
        Some(meta)
    }

    /// Whether every recorded dependency still exists with its recorded
    /// mtime.
    fn dependencies_fresh(meta: &CachedMeta) -> bool {
        meta.dependencies.iter().all(|(path, recorded)| {
            fs::metadata(path)
                .and_then(|m| m.modified())
                .is_ok_and(|current| (mtime_seconds(current) - recorded).abs() <= MTIME_TOLERANCE)
        })
    }
}

impl ArtifactCache for FileArtifactCache {
    fn get(&self, key: &str, fingerprint: &str) -> Option<CachedArtifact> {
        let script_path = self.scripts_dir.join(format!("{key}.ps1"));
        let meta_path = self.meta_dir.join(format!("{key}.json"));

        let meta = self.read_meta(&meta_path)?;
        if meta.fingerprint != fingerprint {
            debug!(key, "artifact cache miss: flag fingerprint changed");
            return None;
        }
        if !Self::dependencies_fresh(&meta) {
            debug!(key, "artifact cache miss: dependency changed");
            return None;
        }

        let script = fs::read_to_string(script_path).ok()?;
        debug!(key, "artifact cache hit");
        Some(CachedArtifact { script, meta })
    }

    fn set(&self, key: &str, fingerprint: &str, script: &str, dependencies: &DependencyMap) {
        let script_path = self.scripts_dir.join(format!("{key}.ps1"));
        let meta_path = self.meta_dir.join(format!("{key}.json"));

        for path in [&script_path, &meta_path] {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
        }

        if let Err(err) = fs::write(&script_path, script) {
            debug!(key, %err, "failed to write cached artifact");
            return;
        }

        let meta = CachedMeta {
            fingerprint: fingerprint.to_owned(),
            dependencies: dependencies
                .iter()
                .map(|(path, time)| (path.clone(), mtime_seconds(*time)))
                .collect(),
            cache_version: self.version.clone(),
        };
        if let Ok(json) = serde_json::to_string(&meta) {
            let _ = fs::write(&meta_path, json);
        }
    }

    fn invalidate(&self, key: &str) {
        let _ = fs::remove_file(self.scripts_dir.join(format!("{key}.ps1")));
        let _ = fs::remove_file(self.meta_dir.join(format!("{key}.json")));
    }
}
