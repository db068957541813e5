//! Human-readable diagnostics with a source excerpt.
//!
//! One formatter serves both compile-time errors and the runtime adapter:
//! when an executed artifact fails, the collaborator feeds the recorded
//! `PugPath`/`PugLine` coordinates back through [`annotate`].

use std::fs;
use std::path::Path;

/// Render a diagnostic for `detail` at `path:line` with `context` lines of
/// source before and after.
///
/// ```text
/// views/page.pug:7
///     5 | ul
///     6 |   li one
/// >   7 |   li= $data.missing.sub
///     8 |   li three
///     9 | footer
///
/// property 'sub' cannot be found
/// ```
///
/// When the file cannot be read the excerpt degrades to
/// `detail (File not found: path:line)`.
#[must_use]
pub fn annotate(path: &Path, line: u32, detail: &str, context: usize) -> String {
    let Ok(content) = fs::read_to_string(path) else {
        return format!("{detail} (File not found: {}:{line})", path.display());
    };
    annotate_content(&content, path, line, detail, context)
}

/// Like [`annotate`], but over already-loaded content (stream input).
#[must_use]
pub fn annotate_content(
    content: &str,
    path: &Path,
    line: u32,
    detail: &str,
    context: usize,
) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let line = line as usize;
    let first = line.saturating_sub(context).max(1);
    let last = (line + context).min(lines.len().max(1));
    let width = last.to_string().len();

    let mut out = format!("{}:{line}\n", path.display());
    for n in first..=last {
        let marker = if n == line { "> " } else { "  " };
        let text = lines.get(n - 1).unwrap_or(&"");
        out.push_str(&format!("{marker}{n:>width$} | {text}\n"));
    }
    out.push('\n');
    out.push_str(detail);
    out
}
