//! Compiler flags and the fixed tag/doctype tables.

use std::path::PathBuf;

/// HTML tags that have no closing tag.
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Tags whose content is emitted without indentation prefixes.
///
/// Any open ancestor in this set suppresses pretty-printing, since inserted
/// whitespace would change what the browser displays.
pub const LITERAL_TAGS: &[&str] = &["pre", "code", "textarea", "xmp"];

/// Flags threaded through compilation.
///
/// A `doctype` line may flip the rendering subset (`properties`,
/// `void_self_close`, `container_self_close`, `kebab_case`) on the
/// generator's local copy; the caller's options are never mutated.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Default suffix appended when resolving extension-less include/extends
    /// paths.
    pub extension: String,
    /// Root for absolute (`/`- or `\`-prefixed) include paths. `None` resolves
    /// them against the current file's directory.
    pub base_dir: Option<PathBuf>,
    /// Render boolean attributes as `attr` (true) or `attr="attr"` (false).
    pub properties: bool,
    /// Render void tags as `<img />` instead of `<img>`.
    pub void_self_close: bool,
    /// Render empty container tags as `<div />` instead of `<div></div>`.
    pub container_self_close: bool,
    /// Lower CamelCase tag names to kebab-case (disabled in XML mode).
    pub kebab_case: bool,
    /// Lines of source shown before and after an error location.
    pub error_context: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            extension: "pug".to_owned(),
            base_dir: None,
            properties: true,
            void_self_close: false,
            container_self_close: false,
            kebab_case: true,
            error_context: 2,
        }
    }
}

impl CompileOptions {
    /// Whether `tag` is in the void set.
    #[must_use]
    pub fn is_void_tag(tag: &str) -> bool {
        VOID_TAGS.contains(&tag)
    }

    /// Whether `tag` suppresses indentation of its content.
    #[must_use]
    pub fn is_literal_tag(tag: &str) -> bool {
        LITERAL_TAGS.contains(&tag)
    }
}

/// Look up a doctype shorthand.
///
/// Returns `None` for unknown shorthands, which render as
/// `<!DOCTYPE {verbatim}>`.
#[must_use]
pub fn doctype(kind: &str) -> Option<&'static str> {
    Some(match kind {
        "html" | "5" => "<!DOCTYPE html>",
        "xml" => r#"<?xml version="1.0" encoding="utf-8" ?>"#,
        "transitional" => {
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">"#
        }
        "strict" => {
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#
        }
        "frameset" => {
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Frameset//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-frameset.dtd">"#
        }
        "1.1" => {
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">"#
        }
        "basic" => {
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML Basic 1.1//EN" "http://www.w3.org/TR/xhtml-basic/xhtml-basic11.dtd">"#
        }
        "mobile" => {
            r#"<!DOCTYPE html PUBLIC "-//WAPFORUM//DTD XHTML Mobile 1.2//EN" "http://www.openmobilealliance.org/tech/DTD/xhtml-mobile12.dtd">"#
        }
        "plist" => {
            r#"<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">"#
        }
        "svg1.1" => {
            r#"<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">"#
        }
        "smil1" => {
            r#"<!DOCTYPE smil PUBLIC "-//W3C//DTD SMIL 1.0//EN" "http://www.w3.org/TR/REC-smil/SMIL10.dtd">"#
        }
        "smil2" => {
            r#"<!DOCTYPE smil PUBLIC "-//W3C//DTD SMIL 2.0//EN" "http://www.w3.org/2001/SMIL20/SMIL20.dtd">"#
        }
        _ => return None,
    })
}
