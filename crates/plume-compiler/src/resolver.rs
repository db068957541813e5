//! Template resolution: `extends` inheritance and `include` expansion.
//!
//! Each file goes through two passes. Pass A merges the file with its parent
//! when the first non-empty line is an `extends` directive, splicing child
//! `block` overrides into the parent skeleton. Pass B walks the merged lines
//! and splices `include` targets: Pug files recursively, filtered includes
//! as a raw block behind a synthetic filter header, and anything else as
//! literal piped text.
//!
//! The entry points additionally flatten any named `block` directives that
//! survived unoverridden, so the generator never sees one.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::diagnostics;
use crate::error::CompileError;
use crate::lex::{indent_of, parse_filter_chain};
use crate::options::CompileOptions;
use crate::source::{self, DependencyMap, SourceLine};

static EXTENDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^extends\s+(\S+)\s*$").unwrap());
static NAMED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^block\s+([\w-]+)\s*$").unwrap());
static MIXIN_DEF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^mixin\s+[\w-]+").unwrap());

/// Resolves a template tree into one flat annotated-line sequence.
pub struct Resolver<'a> {
    options: &'a CompileOptions,
    deps: DependencyMap,
    /// Files currently being resolved, for cycle rejection.
    active: Vec<PathBuf>,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(options: &'a CompileOptions) -> Self {
        Self {
            options,
            deps: DependencyMap::new(),
            active: Vec::new(),
        }
    }

    /// Resolve the root template from disk.
    pub fn resolve_root(&mut self, path: &Path) -> Result<Vec<SourceLine>, CompileError> {
        let lines = self.resolve_file(path)?;
        Ok(flatten_blocks(lines))
    }

    /// Resolve in-memory content as if it lived at `virtual_path`.
    ///
    /// Relative includes and extends resolve against `virtual_path`'s parent
    /// directory (or the current directory when it has none).
    pub fn resolve_source(
        &mut self,
        content: &str,
        virtual_path: &Path,
    ) -> Result<Vec<SourceLine>, CompileError> {
        let lines = source::load_str(content, virtual_path);
        let dir = virtual_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let lines = self.apply_inheritance(lines, &dir)?;
        let lines = self.expand_includes(lines, &dir)?;
        Ok(flatten_blocks(lines))
    }

    /// The `path → mtime` record of every file opened.
    #[must_use]
    pub fn into_dependencies(self) -> DependencyMap {
        self.deps
    }

    /// Load and fully resolve one file (both passes, no block flattening).
    fn resolve_file(&mut self, path: &Path) -> Result<Vec<SourceLine>, CompileError> {
        if self.active.iter().any(|p| p == path) {
            return Err(CompileError::CyclicExtends(format!(
                "cyclic template reference: {} is already being resolved",
                path.display()
            )));
        }
        debug!(path = %path.display(), "resolving template");

        let lines = source::load_file(path)?;
        source::record_dependency(&mut self.deps, path);
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        self.active.push(path.to_path_buf());
        let result = self
            .apply_inheritance(lines, &dir)
            .and_then(|lines| self.expand_includes(lines, &dir));
        self.active.pop();
        result
    }

    /// Pass A: merge with the parent template when the file extends one.
    fn apply_inheritance(
        &mut self,
        lines: Vec<SourceLine>,
        dir: &Path,
    ) -> Result<Vec<SourceLine>, CompileError> {
        let Some(first_idx) = lines.iter().position(|l| !l.text.trim().is_empty()) else {
            return Ok(lines);
        };
        let first = &lines[first_idx];
        let Some(caps) = EXTENDS.captures(first.text.trim()) else {
            return Ok(lines);
        };
        let target = caps.get(1).map_or("", |m| m.as_str());

        let parent_path = self.resolve_path(target, dir);
        if !parent_path.exists() {
            return Err(CompileError::ExtendsNotFound(diagnostics::annotate(
                &first.path,
                first.line,
                &format!("extends target not found: {target}"),
                self.options.error_context,
            )));
        }
        let parent = self.resolve_file(&parent_path)?;

        let child = &lines[first_idx + 1..];
        let (blocks, mixins) = scan_child(child);
        debug!(
            parent = %parent_path.display(),
            blocks = blocks.len(),
            mixins = mixins.len(),
            "merging inheritance"
        );

        let mut out: Vec<SourceLine> = Vec::with_capacity(parent.len());
        for mixin in mixins {
            out.extend(mixin);
        }

        let mut i = 0;
        while i < parent.len() {
            let line = &parent[i];
            let trimmed = line.text.trim();
            if let Some(caps) = NAMED_BLOCK.captures(trimmed) {
                let name = caps.get(1).map_or("", |m| m.as_str());
                let b = indent_of(&line.text);
                let body_end = block_body_end(&parent, i + 1, b);
                if let Some((_, body)) = blocks.iter().find(|(n, _)| n == name) {
                    out.extend(reindent(body, b));
                    i = body_end;
                } else {
                    // No override: keep the directive and its default body;
                    // the directive itself is flattened at the root.
                    out.push(line.clone());
                    i += 1;
                }
                continue;
            }
            out.push(line.clone());
            i += 1;
        }
        Ok(out)
    }

    /// Pass B: splice `include` directives.
    fn expand_includes(
        &mut self,
        lines: Vec<SourceLine>,
        dir: &Path,
    ) -> Result<Vec<SourceLine>, CompileError> {
        let mut out = Vec::with_capacity(lines.len());
        let mut comment_indent: Option<usize> = None;

        for line in lines {
            let indent = indent_of(&line.text);
            let trimmed = line.text.trim();

            if let Some(ci) = comment_indent {
                if trimmed.is_empty() || indent > ci {
                    out.push(line);
                    continue;
                }
                comment_indent = None;
            }
            if trimmed.starts_with("//") {
                comment_indent = Some(indent);
                out.push(line);
                continue;
            }

            let Some(directive) = parse_include(trimmed) else {
                out.push(line);
                continue;
            };
            self.splice_include(&line, indent, directive, dir, &mut out)?;
        }
        Ok(out)
    }

    fn splice_include(
        &mut self,
        site: &SourceLine,
        indent: usize,
        directive: IncludeDirective<'_>,
        dir: &Path,
        out: &mut Vec<SourceLine>,
    ) -> Result<(), CompileError> {
        let path = self.resolve_path(directive.path, dir);
        if !path.exists() {
            return Err(CompileError::IncludeNotFound(diagnostics::annotate(
                &site.path,
                site.line,
                &format!("include target not found: {}", directive.path),
                self.options.error_context,
            )));
        }
        let pad = " ".repeat(indent);

        if let Some(chain) = directive.filter_chain {
            // Filtered include: a synthetic filter header, then the raw file
            // body two columns deeper. The filter owns content semantics, so
            // no recursive resolution happens.
            source::record_dependency(&mut self.deps, &path);
            let content = std::fs::read_to_string(&path)?;
            out.push(SourceLine::new(format!("{pad}{chain}"), &site.path, site.line));
            for raw in source::load_str(&content, &path) {
                out.push(SourceLine::new(
                    format!("{pad}  {}", raw.text),
                    raw.path,
                    raw.line,
                ));
            }
            return Ok(());
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext == self.options.extension || ext == "pug" {
            debug!(path = %path.display(), "splicing template include");
            for inner in self.resolve_file(&path)? {
                out.push(SourceLine::new(
                    format!("{pad}{}", inner.text),
                    inner.path,
                    inner.line,
                ));
            }
        } else {
            // Literal splice: every line becomes piped text at the include
            // site's indent.
            source::record_dependency(&mut self.deps, &path);
            let content = std::fs::read_to_string(&path)?;
            for raw in source::load_str(&content, &path) {
                out.push(SourceLine::new(
                    format!("{pad}| {}", raw.text),
                    raw.path,
                    raw.line,
                ));
            }
        }
        Ok(())
    }

    /// Resolve an include/extends path against the current directory,
    /// honoring `base_dir` for absolute specs and retrying the configured
    /// extension and `.pug` for extension-less misses.
    fn resolve_path(&self, target: &str, dir: &Path) -> PathBuf {
        let absolute = target.starts_with('/') || target.starts_with('\\');
        let candidate = if absolute {
            let rel = target.trim_start_matches(['/', '\\']);
            self.options
                .base_dir
                .as_deref()
                .unwrap_or(dir)
                .join(rel)
        } else {
            dir.join(target)
        };

        if candidate.exists() || candidate.extension().is_some() {
            return candidate;
        }
        let with_ext = candidate.with_extension(&self.options.extension);
        if with_ext.exists() {
            return with_ext;
        }
        let with_pug = candidate.with_extension("pug");
        if with_pug.exists() {
            return with_pug;
        }
        candidate
    }
}

/// A parsed `include` line.
struct IncludeDirective<'t> {
    /// The literal `:filter(args)…` chain text, if present.
    filter_chain: Option<&'t str>,
    path: &'t str,
}

/// Parse `include[:filter(args)…] <path>` from a trimmed line.
fn parse_include(trimmed: &str) -> Option<IncludeDirective<'_>> {
    let rest = trimmed.strip_prefix("include")?;
    if rest.starts_with(':') {
        let (_, end) = parse_filter_chain(rest)?;
        let path = rest[end..].trim();
        if path.is_empty() {
            return None;
        }
        Some(IncludeDirective {
            filter_chain: Some(&rest[..end]),
            path,
        })
    } else {
        let path = rest.trim();
        if path.is_empty() || !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(IncludeDirective {
            filter_chain: None,
            path,
        })
    }
}

/// Scan a child template for `block` overrides and top-level mixins,
/// ignoring `//-` comment regions.
fn scan_child(lines: &[SourceLine]) -> (Vec<(String, Vec<SourceLine>)>, Vec<Vec<SourceLine>>) {
    let mut blocks = Vec::new();
    let mut mixins = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        let indent = indent_of(&line.text);
        let trimmed = line.text.trim();

        if trimmed.is_empty() || indent > 0 {
            i += 1;
            continue;
        }
        if trimmed.starts_with("//-") {
            i = block_body_end(lines, i + 1, indent);
            continue;
        }
        if let Some(caps) = NAMED_BLOCK.captures(trimmed) {
            let end = block_body_end(lines, i + 1, indent);
            let name = caps.get(1).map_or("", |m| m.as_str()).to_owned();
            blocks.push((name, lines[i + 1..end].to_vec()));
            i = end;
            continue;
        }
        if MIXIN_DEF.is_match(trimmed) {
            let end = block_body_end(lines, i + 1, indent);
            mixins.push(lines[i..end].to_vec());
            i = end;
            continue;
        }
        i += 1;
    }
    (blocks, mixins)
}

/// Index one past the last line belonging to a body opened at `indent`.
///
/// Blank lines inside the body are kept; the body ends at the first
/// non-blank line indented at or shallower than `indent`.
fn block_body_end(lines: &[SourceLine], start: usize, indent: usize) -> usize {
    let mut end = start;
    let mut last_content = start;
    while end < lines.len() {
        let text = &lines[end].text;
        if text.trim().is_empty() {
            end += 1;
            continue;
        }
        if indent_of(text) <= indent {
            break;
        }
        end += 1;
        last_content = end;
    }
    last_content
}

/// Shift a block body so its minimum content indent becomes `target`,
/// preserving blank lines verbatim.
fn reindent(body: &[SourceLine], target: usize) -> Vec<SourceLine> {
    let min = body
        .iter()
        .filter(|l| !l.text.trim().is_empty())
        .map(|l| indent_of(&l.text))
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|line| {
            if line.text.trim().is_empty() {
                return line.clone();
            }
            let depth = target + (indent_of(&line.text) - min);
            SourceLine::new(
                format!("{}{}", " ".repeat(depth), line.text.trim_start()),
                &line.path,
                line.line,
            )
        })
        .collect()
}

/// Replace surviving named `block` directives with their default bodies,
/// reindented to the directive's own indent.
///
/// Lines inside mixin definitions are left alone: there, `block` belongs to
/// the mixin's trailing-body mechanism, not to inheritance.
fn flatten_blocks(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    let mut out = Vec::with_capacity(lines.len());
    let mut comment_indent: Option<usize> = None;
    let mut mixin_indent: Option<usize> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        let indent = indent_of(&line.text);
        let trimmed = line.text.trim();

        if let Some(ci) = comment_indent {
            if trimmed.is_empty() || indent > ci {
                out.push(line.clone());
                i += 1;
                continue;
            }
            comment_indent = None;
        }
        if let Some(mi) = mixin_indent {
            if trimmed.is_empty() || indent > mi {
                out.push(line.clone());
                i += 1;
                continue;
            }
            mixin_indent = None;
        }
        if trimmed.starts_with("//") {
            comment_indent = Some(indent);
        } else if MIXIN_DEF.is_match(trimmed) {
            mixin_indent = Some(indent);
        } else if NAMED_BLOCK.is_match(trimmed) {
            let end = block_body_end(&lines, i + 1, indent);
            out.extend(reindent(&lines[i + 1..end], indent));
            i = end;
            continue;
        }
        out.push(line.clone());
        i += 1;
    }
    out
}
