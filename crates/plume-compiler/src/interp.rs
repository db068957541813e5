//! Text escaping and interpolation.
//!
//! Turns raw template text into the content of a double-quoted host string.
//! Three interpolation forms are honored: `#{expr}` / `#(expr)` evaluate
//! HTML-escaped, `${expr}` evaluates raw, and `#[tag …]` splices an inline
//! tag rendered by the caller. Everything else passes through byte-for-byte,
//! with host string metacharacters escaped.

use crate::error::CompileError;
use crate::lex::balanced;

/// Escape one literal character for a double-quoted host string.
fn push_literal(out: &mut String, ch: char) {
    match ch {
        '"' => out.push_str("`\""),
        '`' => out.push_str("``"),
        '$' => out.push_str("`$"),
        _ => out.push(ch),
    }
}

/// Escape literal text for a double-quoted host string.
#[must_use]
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        push_literal(&mut out, ch);
    }
    out
}

/// Convert raw template text to host string content.
///
/// `inline_tag` renders the inside of a `#[…]` interpolation (a single tag
/// expression) into string content to splice; the generator supplies it.
pub fn interpolate(
    raw: &str,
    mut inline_tag: impl FnMut(&str) -> Result<String, CompileError>,
) -> Result<String, CompileError> {
    let mut out = String::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;

    while i < raw.len() {
        let rest = &raw[i..];
        let ch = rest.chars().next().unwrap_or('\0');

        // \x or `x consumes the escape when x is an interpolation
        // metacharacter, emitting x literally.
        if (ch == '\\' || ch == '`') && i + 1 < raw.len() {
            let next = bytes[i + 1];
            if matches!(next, b'$' | b'`' | b'\\') {
                push_literal(&mut out, next as char);
                i += 2;
                continue;
            }
        }

        if rest.starts_with("#{") || rest.starts_with("#(") {
            let (open, close) = if rest.as_bytes()[1] == b'{' {
                ('{', '}')
            } else {
                ('(', ')')
            };
            if let Some((expr, end)) = balanced(raw, i + 1, open, close) {
                out.push_str("$(out_enc (");
                out.push_str(expr.trim());
                out.push_str("))");
                i = end + 1;
                continue;
            }
        }

        if rest.starts_with("#[") {
            if let Some((tag, end)) = balanced(raw, i + 1, '[', ']') {
                out.push_str(&inline_tag(tag.trim())?);
                i = end + 1;
                continue;
            }
        }

        if rest.starts_with("${") {
            if let Some((expr, end)) = balanced(raw, i + 1, '{', '}') {
                out.push_str("$(");
                out.push_str(expr.trim());
                out.push(')');
                i = end + 1;
                continue;
            }
        }

        push_literal(&mut out, ch);
        i += ch.len_utf8();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn no_tags(raw: &str) -> String {
        interpolate(raw, |_| panic!("unexpected inline tag")).unwrap()
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(no_tags("Hello, world!"), "Hello, world!");
    }

    #[test]
    fn test_host_metacharacters_escaped() {
        assert_eq!(no_tags(r#"say "hi""#), "say `\"hi`\"");
        assert_eq!(no_tags("cost: $5"), "cost: `$5");
        assert_eq!(no_tags("tick ` mark"), "tick `` mark");
    }

    #[test]
    fn test_escaped_interpolation() {
        assert_eq!(no_tags("Hello #{$data.name}!"), "Hello $(out_enc ($data.name))!");
        assert_eq!(no_tags("Hi #($name)"), "Hi $(out_enc ($name))");
    }

    #[test]
    fn test_raw_interpolation() {
        assert_eq!(no_tags("x ${$raw.html} y"), "x $($raw.html) y");
    }

    #[test]
    fn test_backslash_escape_consumed() {
        assert_eq!(no_tags(r"literal \$price"), "literal `$price");
        assert_eq!(no_tags(r"slash \\ kept"), r"slash \ kept");
        assert_eq!(no_tags(r"other \n kept"), r"other \n kept");
    }

    #[test]
    fn test_backtick_escape_consumed() {
        assert_eq!(no_tags("literal `$price"), "literal `$price");
    }

    #[test]
    fn test_inline_tag_spliced() {
        let out = interpolate("see #[b bold] text", |tag| {
            assert_eq!(tag, "b bold");
            Ok("<b>bold</b>".to_owned())
        })
        .unwrap();
        assert_eq!(out, "see <b>bold</b> text");
    }

    #[test]
    fn test_unterminated_interpolation_is_literal() {
        assert_eq!(no_tags("broken #{oops"), "broken #{oops");
    }

    #[test]
    fn test_nested_braces_in_expression() {
        assert_eq!(
            no_tags("#{@{ a = 1 }.a}"),
            "$(out_enc (@{ a = 1 }.a))"
        );
    }

    #[test]
    fn test_spaces_preserved() {
        assert_eq!(no_tags("  keep   spacing  "), "  keep   spacing  ");
    }
}
