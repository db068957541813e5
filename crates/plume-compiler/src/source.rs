//! Source loading: annotated lines and the dependency record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::CompileError;

/// A single physical line of template source plus its origin.
///
/// Origins survive resolver rewrites, so a generated-code failure can always
/// be traced back to the file and line the author wrote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLine {
    /// Line content without the trailing newline.
    pub text: String,
    /// File the line came from ("<input>" for stream input).
    pub path: PathBuf,
    /// 1-based line number within `path`.
    pub line: u32,
}

impl SourceLine {
    /// Build a line annotated with its origin.
    #[must_use]
    pub fn new(text: impl Into<String>, path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            text: text.into(),
            path: path.into(),
            line,
        }
    }
}

/// Every file opened during a compilation, with its last-modified time.
///
/// External caches key compiled artifacts by this record: the artifact is
/// stale as soon as any transitive dependency changes.
pub type DependencyMap = BTreeMap<PathBuf, SystemTime>;

/// Read a template file into annotated lines.
///
/// A missing file is reported as [`CompileError::TemplateNotFound`].
pub fn load_file(path: &Path) -> Result<Vec<SourceLine>, CompileError> {
    let content = fs::read_to_string(path)
        .map_err(|_| CompileError::TemplateNotFound(path.to_path_buf()))?;
    Ok(split_lines(&content, path))
}

/// Split in-memory template content into annotated lines.
///
/// `virtual_path` is used for diagnostics and for resolving relative
/// includes; it does not have to exist on disk.
#[must_use]
pub fn load_str(content: &str, virtual_path: &Path) -> Vec<SourceLine> {
    split_lines(content, virtual_path)
}

fn split_lines(content: &str, path: &Path) -> Vec<SourceLine> {
    content
        .lines()
        .enumerate()
        .map(|(idx, text)| SourceLine::new(text, path, u32::try_from(idx + 1).unwrap_or(u32::MAX)))
        .collect()
}

/// Record `path`'s mtime into a dependency map.
///
/// Files whose mtime cannot be read (racing deletion, exotic filesystems)
/// are recorded with [`SystemTime::UNIX_EPOCH`] so the cache still sees a
/// key for them.
pub fn record_dependency(deps: &mut DependencyMap, path: &Path) {
    let mtime = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    deps.insert(path.to_path_buf(), mtime);
}
