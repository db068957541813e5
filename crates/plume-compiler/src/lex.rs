//! Shared lexing utilities.
//!
//! Indentation measurement, balanced-delimiter extraction, attribute-list
//! splitting and filter-chain parsing. Everything here is line-oriented and
//! quote-aware: `'…'` and `"…"` substrings are opaque to delimiter counting.

/// Number of leading whitespace columns of a line.
///
/// Tabs and spaces each count as one column; templates are expected to be
/// consistent about which they use.
#[must_use]
pub fn indent_of(text: &str) -> usize {
    text.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// Extract the substring between a balanced pair of delimiters.
///
/// `start` must index an occurrence of `open` in `s`. Returns the inner
/// substring (exclusive) and the byte index of the matching `close`, or
/// `None` when the scan exhausts the string before balancing.
#[must_use]
pub fn balanced(s: &str, start: usize, open: char, close: char) -> Option<(&str, usize)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut inner_start = 0;

    for (idx, ch) in s[start..].char_indices() {
        let idx = start + idx;
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            c if c == open => {
                depth += 1;
                if depth == 1 {
                    inner_start = idx + open.len_utf8();
                }
            }
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[inner_start..idx], idx));
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether `s` opens a parenthesis it never closes.
///
/// Drives multi-line attribute continuations: a tag line with an open `(`
/// keeps absorbing physical lines until the parenthesis balances.
#[must_use]
pub fn has_open_paren(s: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for ch in s.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

/// One parsed entry of a `(...)` attribute list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name as written.
    pub name: String,
    /// Host expression for the value; `None` for boolean attributes.
    pub value: Option<String>,
    /// False when the author used `!=` to suppress HTML escaping.
    pub escaped: bool,
}

/// Split the inside of an attribute list into [`Attribute`] pairs.
///
/// Commas at depth 0 always separate. Spaces at depth 0 separate only when
/// neither side is an incomplete `key=` fragment, so `a=1 b=2`, `a = 1` and
/// `a=fn(1, 2) b` all split as expected.
#[must_use]
pub fn split_attributes(list: &str) -> Vec<Attribute> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let chars: Vec<char> = list.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                push_pair(&mut pairs, &mut current);
            }
            ' ' if depth == 0 => {
                let left_open = current.trim_end().ends_with('=');
                let right_open = chars[i..]
                    .iter()
                    .find(|c| **c != ' ')
                    .is_some_and(|c| *c == '=' || *c == '!');
                if left_open || right_open {
                    current.push(ch);
                } else {
                    push_pair(&mut pairs, &mut current);
                }
            }
            _ => current.push(ch),
        }
        i += 1;
    }
    push_pair(&mut pairs, &mut current);
    pairs
}

fn push_pair(pairs: &mut Vec<Attribute>, current: &mut String) {
    let pair = std::mem::take(current);
    let pair = pair.trim();
    if pair.is_empty() {
        return;
    }
    pairs.push(parse_pair(pair));
}

/// Parse one `name`, `name=expr` or `name!=expr` fragment.
fn parse_pair(pair: &str) -> Attribute {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in pair.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => {
                let (name, escaped) = match pair[..idx].strip_suffix('!') {
                    Some(name) => (name, false),
                    None => (&pair[..idx], true),
                };
                return Attribute {
                    name: name.trim().to_owned(),
                    value: Some(pair[idx + 1..].trim().to_owned()),
                    escaped,
                };
            }
            _ => {}
        }
    }
    Attribute {
        name: pair.to_owned(),
        value: None,
        escaped: true,
    }
}

/// One call in a filter chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterCall {
    /// Host function name.
    pub name: String,
    /// Lone argument tokens, passed positionally.
    pub positional: Vec<String>,
    /// `key=val` arguments, passed as named parameters.
    pub named: Vec<(String, String)>,
}

/// Parse `:fn1(args):fn2…` starting at a leading `:`.
///
/// Returns the ordered calls and the byte offset just past the chain (the
/// start of any inline content). Returns `None` when `s` does not begin a
/// chain.
#[must_use]
pub fn parse_filter_chain(s: &str) -> Option<(Vec<FilterCall>, usize)> {
    let mut calls = Vec::new();
    let mut pos = 0;

    while s[pos..].starts_with(':') {
        let name_start = pos + 1;
        let name_len = s[name_start..]
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(s.len() - name_start);
        if name_len == 0 {
            return None;
        }
        let name = &s[name_start..name_start + name_len];
        pos = name_start + name_len;

        let mut positional = Vec::new();
        let mut named = Vec::new();
        if s[pos..].starts_with('(') {
            let (inner, close) = balanced(s, pos, '(', ')')?;
            for attr in split_attributes(inner) {
                match attr.value {
                    Some(value) => named.push((attr.name, value)),
                    None => positional.push(attr.name),
                }
            }
            pos = close + 1;
        }
        calls.push(FilterCall {
            name: name.to_owned(),
            positional,
            named,
        });
    }

    if calls.is_empty() { None } else { Some((calls, pos)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, value: Option<&str>, escaped: bool) -> Attribute {
        Attribute {
            name: name.to_owned(),
            value: value.map(str::to_owned),
            escaped,
        }
    }

    #[test]
    fn test_indent_counts_spaces_and_tabs() {
        assert_eq!(indent_of("p hi"), 0);
        assert_eq!(indent_of("    p hi"), 4);
        assert_eq!(indent_of("\t\tp"), 2);
        assert_eq!(indent_of(""), 0);
    }

    #[test]
    fn test_balanced_simple() {
        let (inner, close) = balanced("a(b, c) d", 1, '(', ')').unwrap();
        assert_eq!(inner, "b, c");
        assert_eq!(close, 6);
    }

    #[test]
    fn test_balanced_nested_and_quoted() {
        let s = r#"(f(x, ")"), y)"#;
        let (inner, _) = balanced(s, 0, '(', ')').unwrap();
        assert_eq!(inner, r#"f(x, ")"), y"#);
    }

    #[test]
    fn test_balanced_unterminated() {
        assert!(balanced("a(b", 1, '(', ')').is_none());
    }

    #[test]
    fn test_has_open_paren() {
        assert!(has_open_paren("input(type='text',"));
        assert!(!has_open_paren("input(type='text')"));
        assert!(!has_open_paren(r#"p("(")"#));
    }

    #[test]
    fn test_split_boolean_attribute() {
        assert_eq!(split_attributes("disabled"), vec![attr("disabled", None, true)]);
    }

    #[test]
    fn test_split_on_commas() {
        assert_eq!(
            split_attributes("a=1, b=2"),
            vec![attr("a", Some("1"), true), attr("b", Some("2"), true)]
        );
    }

    #[test]
    fn test_split_on_spaces() {
        assert_eq!(
            split_attributes("a=1 b=2 checked"),
            vec![
                attr("a", Some("1"), true),
                attr("b", Some("2"), true),
                attr("checked", None, true),
            ]
        );
    }

    #[test]
    fn test_space_around_equals_does_not_split() {
        assert_eq!(
            split_attributes("a = 1 b =2 c= 3"),
            vec![
                attr("a", Some("1"), true),
                attr("b", Some("2"), true),
                attr("c", Some("3"), true),
            ]
        );
    }

    #[test]
    fn test_quoted_and_nested_values_are_opaque() {
        let attrs = split_attributes(r#"title="a, b" onclick=go(1, 2)"#);
        assert_eq!(
            attrs,
            vec![
                attr("title", Some(r#""a, b""#), true),
                attr("onclick", Some("go(1, 2)"), true),
            ]
        );
    }

    #[test]
    fn test_unescaped_operator() {
        assert_eq!(
            split_attributes("html!=$raw"),
            vec![attr("html", Some("$raw"), false)]
        );
    }

    #[test]
    fn test_filter_chain_single() {
        let (calls, rest) = parse_filter_chain(":markdown").unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "markdown");
        assert!(calls[0].positional.is_empty());
        assert_eq!(rest, 9);
    }

    #[test]
    fn test_filter_chain_with_args_and_inline() {
        let (calls, rest) = parse_filter_chain(":wrap(width=72 hard):trim inline text").unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "wrap");
        assert_eq!(calls[0].named, vec![("width".to_owned(), "72".to_owned())]);
        assert_eq!(calls[0].positional, vec!["hard"]);
        assert_eq!(calls[1].name, "trim");
        assert_eq!(&":wrap(width=72 hard):trim inline text"[rest..], " inline text");
    }

    #[test]
    fn test_filter_chain_rejects_non_chain() {
        assert!(parse_filter_chain("p text").is_none());
        assert!(parse_filter_chain(": broken").is_none());
    }
}
