//! Single-pass code generation over resolved lines.
//!
//! The generator walks the flat annotated-line sequence once, maintaining
//! the open-frame stack from [`crate::scope`], and emits host-script
//! statements into a body buffer. Output lines are accumulated at render
//! time into `$lines` and joined once at the end; the generator itself
//! appends to a `Vec<String>` joined once by the artifact assembler, so
//! neither side concatenates quadratically.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::diagnostics;
use crate::error::CompileError;
use crate::interp::{escape_literal, interpolate};
use crate::lex::{
    Attribute, balanced, has_open_paren, indent_of, parse_filter_chain, split_attributes,
};
use crate::options::{self, CompileOptions};
use crate::scope::{Frame, FrameKind, indent_prefix};
use crate::source::SourceLine;

/// Host keywords that open a control-flow block when used in a `- ` line.
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "elseif", "else", "foreach", "for", "while", "switch", "try", "catch", "finally",
    "default",
];

// Namespace colons (svg:use) are part of the name only when followed by a
// word character, so `li: a` still parses as block expansion.
static TAG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][\w-]*(?::[\w-]+)*").unwrap());
static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[.#][\w-]+").unwrap());
static MIXIN_DEF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^mixin\s+([\w-]+)").unwrap());
static MIXIN_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+([\w-]+)").unwrap());
static SWITCH_ARM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^('[^']*'|"[^"]*"|-?\d+(\.\d+)?|default)$"#).unwrap());

/// Walks resolved lines and emits host-script body statements.
pub struct Generator {
    options: CompileOptions,
    xml: bool,
    frames: Vec<Frame>,
    body: Vec<String>,
    last_trace: Option<(PathBuf, u32)>,
}

impl Generator {
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            xml: false,
            frames: Vec::new(),
            body: Vec::new(),
            last_trace: None,
        }
    }

    /// Whether a `doctype xml` switched the generator into XML mode.
    #[must_use]
    pub fn xml_mode(&self) -> bool {
        self.xml
    }

    /// Generate host-script body lines for the resolved template.
    ///
    /// The scope stack is fully unwound before returning, so every opened
    /// tag and brace is closed no matter how the input ends.
    pub fn generate(mut self, lines: &[SourceLine]) -> Result<Vec<String>, CompileError> {
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            if line.text.trim().is_empty() {
                i += 1;
                continue;
            }
            let indent = indent_of(&line.text);
            let mut text = line.text.trim().to_owned();

            // Multi-line attribute continuation: a tag-like line with an open
            // parenthesis absorbs physical lines until it balances.
            let mut joined = 1;
            if is_tag_like(&text) && has_open_paren(&text) {
                while has_open_paren(&text) && i + joined < lines.len() {
                    text.push(' ');
                    text.push_str(lines[i + joined].text.trim());
                    joined += 1;
                }
                if has_open_paren(&text) {
                    return Err(CompileError::UnterminatedAttribute(diagnostics::annotate(
                        &line.path,
                        line.line,
                        "unterminated attribute list",
                        self.options.error_context,
                    )));
                }
            }

            self.close_frames(indent);
            let consumed = self.dispatch(&text, indent, line, &lines[i + joined..])?;
            i += joined + consumed;
        }
        self.close_frames(0);
        Ok(self.body)
    }

    // ---- frame management ----

    fn close_frames(&mut self, indent: usize) {
        while self.frames.last().is_some_and(|f| f.indent >= indent) {
            self.close_one();
        }
    }

    fn close_one(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        match frame.kind {
            FrameKind::Element {
                tag,
                is_void,
                is_literal,
                prefix,
            } => {
                if !is_void {
                    // No whitespace ahead of a literal tag's closing tag;
                    // it would become part of the element's content.
                    let prefix = if is_literal { String::new() } else { prefix };
                    self.add(format!("{prefix}</{tag}>"));
                }
            }
            FrameKind::Code {
                is_explicit_brace, ..
            } => {
                if !is_explicit_brace {
                    self.body.push("}".to_owned());
                }
            }
            FrameKind::Mixin { .. } => self.body.push("}".to_owned()),
        }
    }

    fn push_element(&mut self, indent: usize, tag: &str, prefix: String) {
        self.frames.push(Frame::new(
            indent,
            FrameKind::Element {
                tag: tag.to_owned(),
                is_void: CompileOptions::is_void_tag(tag),
                is_literal: CompileOptions::is_literal_tag(tag),
                prefix,
            },
        ));
    }

    // ---- emission helpers ----

    /// Append a `$lines.Add("…")` statement; `content` is double-quoted
    /// string content (literals already escaped, subexpressions raw).
    fn add(&mut self, content: String) {
        self.body.push(format!("$lines.Add(\"{content}\")"));
    }

    /// Update the runtime trace coordinates before a fragment that may raise.
    fn emit_trace(&mut self, origin: &SourceLine) {
        let key = (origin.path.clone(), origin.line);
        if self.last_trace.as_ref() == Some(&key) {
            return;
        }
        self.body.push(format!(
            "$script:src_line = {}; $script:src_path = '{}'",
            origin.line,
            single_quote(&origin.path.display().to_string())
        ));
        self.last_trace = Some(key);
    }

    fn parse_error(&self, origin: &SourceLine, detail: &str) -> CompileError {
        CompileError::Parse(diagnostics::annotate(
            &origin.path,
            origin.line,
            detail,
            self.options.error_context,
        ))
    }

    // ---- line dispatch ----

    /// Classify one logical line and emit for it. Returns how many of the
    /// following lines were consumed as a child block.
    fn dispatch(
        &mut self,
        text: &str,
        indent: usize,
        origin: &SourceLine,
        rest: &[SourceLine],
    ) -> Result<usize, CompileError> {
        // Silent comment: swallow the block.
        if text.starts_with("//-") {
            let (_, consumed) = child_block(rest, indent);
            return Ok(consumed);
        }
        if let Some(inline) = text.strip_prefix("//") {
            return Ok(self.emit_comment(inline, indent, rest));
        }
        if text == "-" {
            return self.emit_raw_code(indent, origin, rest);
        }
        if let Some(expr) = text.strip_prefix('-') {
            self.emit_code_line(expr.trim(), indent, origin);
            return Ok(0);
        }
        if text.starts_with(':') {
            return self.emit_filter(text, indent, origin, rest);
        }
        if text == "doctype" || text.starts_with("doctype ") {
            self.emit_doctype(text.strip_prefix("doctype").unwrap_or("").trim());
            return Ok(0);
        }
        if text.starts_with('<') {
            let prefix = indent_prefix(&self.frames);
            self.add(format!("{prefix}{}", escape_literal(text)));
            return Ok(0);
        }
        if text == "block" || text.starts_with("block ") {
            if !self
                .frames
                .iter()
                .any(|f| matches!(f.kind, FrameKind::Mixin { .. }))
            {
                return Err(self.parse_error(origin, "`block` is only valid inside a mixin"));
            }
            let prefix = indent_prefix(&self.frames);
            self.body
                .push(format!("if ($null -ne $block) {{ & $block \"{prefix}\" }}"));
            return Ok(0);
        }
        if text.starts_with("mixin ") {
            return self.emit_mixin_def(text, indent, origin);
        }
        if text.starts_with('+') {
            return self.emit_mixin_call(text, indent, origin, rest);
        }
        if let Some(expr) = text.strip_prefix("!=") {
            self.emit_trace(origin);
            let prefix = indent_prefix(&self.frames);
            self.add(format!("{prefix}$({})", expr.trim()));
            return Ok(0);
        }
        if let Some(expr) = text.strip_prefix('=') {
            self.emit_trace(origin);
            let prefix = indent_prefix(&self.frames);
            self.add(format!("{prefix}$(out_enc ({}))", expr.trim()));
            return Ok(0);
        }
        if let Some(piped) = text.strip_prefix('|') {
            let content = piped.strip_prefix(' ').unwrap_or(piped);
            let rendered = interpolate(content, |t| self.render_inline_tag(t))?;
            if rendered.contains("$(") {
                self.emit_trace(origin);
            }
            let prefix = indent_prefix(&self.frames);
            self.add(format!("{prefix}{rendered}"));
            return Ok(0);
        }

        match parse_tag(text) {
            Ok(Some(tag)) => self.emit_tag(&tag, indent, origin, rest),
            Ok(None) => Err(self.parse_error(origin, &format!("unrecognized syntax: {text}"))),
            Err(detail) => Err(CompileError::UnterminatedAttribute(diagnostics::annotate(
                &origin.path,
                origin.line,
                &detail,
                self.options.error_context,
            ))),
        }
    }

    /// `// …`: an HTML comment, or host comments inside a `switch` body
    /// where no output statement may sit between case arms.
    fn emit_comment(&mut self, inline: &str, indent: usize, rest: &[SourceLine]) -> usize {
        let (children, consumed) = child_block(rest, indent);

        if self.frames.last().is_some_and(Frame::is_switch) {
            if !inline.trim().is_empty() {
                self.body.push(format!("# {}", inline.trim()));
            }
            for child in children {
                self.body.push(format!("# {}", child.text.trim()));
            }
            return consumed;
        }

        let prefix = indent_prefix(&self.frames);
        if children.is_empty() {
            self.add(format!("{prefix}<!--{}-->", escape_literal(inline)));
            return consumed;
        }
        self.add(format!("{prefix}<!--{}", escape_literal(inline)));
        let min = min_indent(children);
        for child in children {
            if child.text.trim().is_empty() {
                self.add(prefix.clone());
            } else {
                self.add(format!("{prefix}{}", escape_literal(&child.text[min..])));
            }
        }
        self.add(format!("{prefix}-->"));
        consumed
    }

    /// Bare `-`: every deeper line is verbatim host code.
    fn emit_raw_code(
        &mut self,
        indent: usize,
        origin: &SourceLine,
        rest: &[SourceLine],
    ) -> Result<usize, CompileError> {
        let (children, consumed) = child_block(rest, indent);
        if children.is_empty() {
            return Ok(0);
        }
        self.emit_trace(origin);
        let min = min_indent(children);
        for child in children {
            if !child.text.trim().is_empty() {
                self.body.push(child.text[min..].to_owned());
            }
        }
        Ok(consumed)
    }

    /// `- expr`: verbatim host code, opening a block frame for control
    /// keywords and for case arms under a `switch`.
    fn emit_code_line(&mut self, expr: &str, indent: usize, origin: &SourceLine) {
        let word: String = expr.chars().take_while(|c| c.is_alphanumeric()).collect();
        let control = CONTROL_KEYWORDS.contains(&word.as_str());
        let opens_brace = expr.ends_with('{');

        // `default` labels an arm, so it gets arm treatment under a switch.
        if self.frames.last().is_some_and(Frame::is_switch) && (!control || word == "default") {
            // Case arm: auto-open its block. Arms are structural, so no
            // trace update.
            if !SWITCH_ARM.is_match(expr) {
                warn!(
                    path = %origin.path.display(),
                    line = origin.line,
                    arm = expr,
                    "switch arm is neither a quoted string nor a numeric literal"
                );
            }
            self.body.push(format!("{expr} {{"));
            self.frames.push(Frame::new(
                indent,
                FrameKind::Code {
                    is_switch: false,
                    is_explicit_brace: false,
                },
            ));
            return;
        }

        if opens_brace {
            self.body.push(expr.to_owned());
            self.frames.push(Frame::new(
                indent,
                FrameKind::Code {
                    is_switch: word == "switch",
                    is_explicit_brace: true,
                },
            ));
            return;
        }
        if control {
            self.emit_trace(origin);
            self.body.push(format!("{expr} {{"));
            self.frames.push(Frame::new(
                indent,
                FrameKind::Code {
                    is_switch: word == "switch",
                    is_explicit_brace: false,
                },
            ));
            return;
        }
        self.emit_trace(origin);
        self.body.push(expr.to_owned());
    }

    /// `:filter(args)…`: pipe a text block through a chain of host filter
    /// functions.
    fn emit_filter(
        &mut self,
        text: &str,
        indent: usize,
        origin: &SourceLine,
        rest: &[SourceLine],
    ) -> Result<usize, CompileError> {
        let Some((calls, end)) = parse_filter_chain(text) else {
            return Err(self.parse_error(origin, &format!("invalid filter chain: {text}")));
        };
        let inline = text[end..].trim();
        let (children, consumed) = child_block(rest, indent);

        let content = if inline.is_empty() {
            let min = min_indent(children);
            let parts: Vec<String> = children
                .iter()
                .map(|l| {
                    if l.text.trim().is_empty() {
                        String::new()
                    } else {
                        escape_literal(&l.text[min..])
                    }
                })
                .collect();
            format!("\"{}\"", parts.join("`n"))
        } else {
            format!("\"{}\"", escape_literal(inline))
        };

        let mut expr = content;
        for call in &calls {
            let mut args = String::new();
            for pos in &call.positional {
                args.push(' ');
                args.push_str(&argument_expr(pos));
            }
            for (key, value) in &call.named {
                args.push_str(&format!(" -{key} {}", argument_expr(value)));
            }
            expr = format!("{} ({expr}){args}", call.name);
        }

        self.emit_trace(origin);
        let prefix = indent_prefix(&self.frames);
        self.add(format!("{prefix}$({expr})"));
        Ok(consumed)
    }

    /// `doctype <kind>`: append the literal and toggle XML mode.
    fn emit_doctype(&mut self, kind: &str) {
        let kind = if kind.is_empty() { "html" } else { kind };
        let literal = options::doctype(kind)
            .map_or_else(|| format!("<!DOCTYPE {kind}>"), str::to_owned);
        self.body
            .push(format!("$lines.Add('{}')", single_quote(&literal)));

        if kind == "xml" {
            self.xml = true;
            self.options.void_self_close = true;
            self.options.container_self_close = true;
            self.options.properties = false;
            self.options.kebab_case = false;
            self.body.push("$script:pug_properties = $false".to_owned());
        }
    }

    /// `mixin name(params)`: open a host function definition.
    fn emit_mixin_def(
        &mut self,
        text: &str,
        indent: usize,
        origin: &SourceLine,
    ) -> Result<usize, CompileError> {
        let Some(caps) = MIXIN_DEF.captures(text) else {
            return Err(self.parse_error(origin, &format!("invalid mixin definition: {text}")));
        };
        let name = caps.get(1).map_or("", |m| m.as_str());

        let mut params = vec!["$pug_indent".to_owned()];
        if let Some(open) = text.find('(') {
            let Some((inner, _)) = balanced(text, open, '(', ')') else {
                return Err(self.parse_error(origin, "unterminated mixin parameter list"));
            };
            for attr in split_attributes(inner) {
                let pname = if attr.name.starts_with('$') {
                    attr.name.clone()
                } else {
                    format!("${}", attr.name)
                };
                match attr.value {
                    Some(default) => params.push(format!("{pname} = {default}")),
                    None => params.push(pname),
                }
            }
        }
        params.push("$block".to_owned());

        self.body.push(format!("function mixin_{name} {{"));
        self.body.push(format!("param({})", params.join(", ")));
        self.frames
            .push(Frame::new(indent, FrameKind::Mixin { is_definition: true }));
        self.last_trace = None;
        Ok(0)
    }

    /// `+name(args)`: call a mixin, passing the call-site indent and an
    /// optional trailing body as a block argument.
    fn emit_mixin_call(
        &mut self,
        text: &str,
        indent: usize,
        origin: &SourceLine,
        rest: &[SourceLine],
    ) -> Result<usize, CompileError> {
        let Some(caps) = MIXIN_CALL.captures(text) else {
            return Err(self.parse_error(origin, &format!("invalid mixin call: {text}")));
        };
        let name = caps.get(1).map_or("", |m| m.as_str());

        let mut args = String::new();
        if let Some(open) = text.find('(') {
            let Some((inner, _)) = balanced(text, open, '(', ')') else {
                return Err(self.parse_error(origin, "unterminated mixin argument list"));
            };
            for attr in split_attributes(inner) {
                match attr.value {
                    Some(value) => args.push_str(&format!(" -{} ({value})", attr.name)),
                    None => args.push_str(&format!(" ({})", attr.name)),
                }
            }
        }

        let prefix = indent_prefix(&self.frames);
        let has_body = has_children(rest, indent);
        self.emit_trace(origin);
        if has_body {
            self.body
                .push(format!("mixin_{name} \"{prefix}\"{args} -block {{"));
            self.body.push("param($pug_indent)".to_owned());
            self.frames.push(Frame::new(
                indent,
                FrameKind::Mixin {
                    is_definition: false,
                },
            ));
            self.last_trace = None;
        } else {
            self.body.push(format!("mixin_{name} \"{prefix}\"{args}"));
        }
        Ok(0)
    }

    // ---- tags ----

    /// Tag name after optional kebab-case folding.
    fn tag_name(&self, raw: &str) -> String {
        if self.options.kebab_case && !self.xml {
            kebab_case(raw)
        } else {
            raw.to_owned()
        }
    }

    /// Render a `#[…]` inline-tag interpolation into string content.
    fn render_inline_tag(&self, text: &str) -> Result<String, CompileError> {
        let parsed = parse_tag(text)
            .map_err(CompileError::Parse)?
            .ok_or_else(|| CompileError::Parse(format!("invalid inline tag: {text}")))?;
        let name = self.tag_name(&parsed.name);
        let (chunk, _) = self.attr_markup(&parsed)?;
        let (content, _) = self.content_markup(&parsed)?;
        if CompileOptions::is_void_tag(&name) {
            let end = if self.options.void_self_close { " />" } else { ">" };
            return Ok(format!("<{name}{chunk}{end}"));
        }
        Ok(format!(
            "<{name}{chunk}>{}</{name}>",
            content.unwrap_or_default()
        ))
    }

    /// Attribute chunk after `<name`, as string content. The bool reports
    /// whether any host expression is evaluated in it.
    fn attr_markup(&self, tag: &ParsedTag) -> Result<(String, bool), CompileError> {
        // `&attributes(expr)` collects everything into a dictionary merged
        // with the runtime value.
        if let Some(merge) = &tag.merge_expr {
            let mut entries: Vec<String> = Vec::new();
            if let Some(id) = &tag.id {
                entries.push(format!("'id' = '{}'", single_quote(id)));
            }
            let class_value = self.class_value(tag);
            if let Some(value) = class_value {
                entries.push(format!("'class' = {value}"));
            }
            for attr in tag.attrs.iter().filter(|a| a.name != "class") {
                let value = attr
                    .value
                    .as_ref()
                    .map_or_else(|| "$true".to_owned(), |v| format!("({v})"));
                entries.push(format!("'{}' = {value}", single_quote(&attr.name)));
            }
            let chunk = format!(
                "$(out_merged_attrs ([ordered]@{{{}}}) ({merge}))",
                entries.join("; ")
            );
            return Ok((chunk, true));
        }

        let mut out = String::new();
        let mut traced = false;

        if let Some(id) = &tag.id {
            out.push_str(&format!(" id=`\"{}`\"", escape_literal(id)));
        }

        let has_class_attr = tag.attrs.iter().any(|a| a.name == "class");
        if has_class_attr {
            let value = self.class_value(tag).unwrap_or_else(|| "''".to_owned());
            out.push_str(&format!("$(out_attr 'class' {value} $true)"));
            traced = true;
        } else if !tag.classes.is_empty() {
            out.push_str(&format!(
                " class=`\"{}`\"",
                escape_literal(&tag.classes.join(" "))
            ));
        }

        for attr in tag.attrs.iter().filter(|a| a.name != "class") {
            match &attr.value {
                None => out.push_str(&format!(
                    "$(out_attr '{}' $true $true)",
                    single_quote(&attr.name)
                )),
                Some(value) => {
                    traced = true;
                    out.push_str(&format!(
                        "$(out_attr '{}' ({value}) ${})",
                        single_quote(&attr.name),
                        attr.escaped
                    ));
                }
            }
        }
        Ok((out, traced))
    }

    /// Combined class value expression from shorthand classes and `class=`
    /// attributes, or `None` when the tag has neither.
    fn class_value(&self, tag: &ParsedTag) -> Option<String> {
        let mut parts: Vec<String> = tag
            .classes
            .iter()
            .map(|c| format!("'{}'", single_quote(c)))
            .collect();
        for attr in tag.attrs.iter().filter(|a| a.name == "class") {
            match &attr.value {
                Some(value) => parts.push(format!("({value})")),
                None => {}
            }
        }
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(format!("@({})", parts.join(", "))),
        }
    }

    /// Inline content of a tag line, as string content.
    fn content_markup(&self, tag: &ParsedTag) -> Result<(Option<String>, bool), CompileError> {
        match tag.op {
            Some(TagOp::Escaped) => {
                let expr = tag.content.as_deref().unwrap_or_default();
                Ok((Some(format!("$(out_enc ({expr}))")), true))
            }
            Some(TagOp::Raw) => {
                let expr = tag.content.as_deref().unwrap_or_default();
                Ok((Some(format!("$({expr})")), true))
            }
            None => match &tag.content {
                Some(text) => {
                    let rendered = interpolate(text, |t| self.render_inline_tag(t))?;
                    let traced = rendered.contains("$(");
                    Ok((Some(rendered), traced))
                }
                None => Ok((None, false)),
            },
        }
    }

    #[allow(clippy::too_many_lines)]
    fn emit_tag(
        &mut self,
        tag: &ParsedTag,
        indent: usize,
        origin: &SourceLine,
        rest: &[SourceLine],
    ) -> Result<usize, CompileError> {
        // Bare `.`: a raw text block with no wrapping tag.
        if tag.dot_block && tag.name.is_empty() && tag.classes.is_empty() && tag.id.is_none() {
            return self.emit_text_block(indent, origin, rest, None);
        }

        let name = self.tag_name(&tag.name);
        let prefix = indent_prefix(&self.frames);
        let (chunk, attrs_traced) = self.attr_markup(tag)?;

        // Block expansion: `tag: rest` opens the outer tag and re-injects the
        // remainder two columns deeper in this same iteration.
        if let Some(expanded) = &tag.expand {
            if attrs_traced {
                self.emit_trace(origin);
            }
            self.add(format!("{prefix}<{name}{chunk}>"));
            self.push_element(indent, &name, prefix);
            return self.dispatch(expanded, indent + 2, origin, rest);
        }

        if tag.dot_block {
            if attrs_traced {
                self.emit_trace(origin);
            }
            return self.emit_text_block(indent, origin, rest, Some((&name, &chunk, prefix)));
        }

        let (content, content_traced) = self.content_markup(tag)?;
        if attrs_traced || content_traced {
            self.emit_trace(origin);
        }

        if tag.self_close {
            self.add(format!("{prefix}<{name}{chunk} />"));
            return Ok(0);
        }
        if CompileOptions::is_void_tag(&name) {
            let end = if self.options.void_self_close { " />" } else { ">" };
            self.add(format!("{prefix}<{name}{chunk}{end}"));
            return Ok(0);
        }

        if has_children(rest, indent) {
            match content {
                Some(inline) => self.add(format!("{prefix}<{name}{chunk}>{inline}")),
                None => self.add(format!("{prefix}<{name}{chunk}>")),
            }
            self.push_element(indent, &name, prefix);
            return Ok(0);
        }

        match content {
            Some(inline) => self.add(format!("{prefix}<{name}{chunk}>{inline}</{name}>")),
            None if self.options.container_self_close => {
                self.add(format!("{prefix}<{name}{chunk} />"));
            }
            None => self.add(format!("{prefix}<{name}{chunk}></{name}>")),
        }
        Ok(0)
    }

    /// `tag.` raw text block (or a bare `.` block when `open` is `None`).
    fn emit_text_block(
        &mut self,
        indent: usize,
        origin: &SourceLine,
        rest: &[SourceLine],
        open: Option<(&str, &str, String)>,
    ) -> Result<usize, CompileError> {
        let (children, consumed) = child_block(rest, indent);

        let had_open = open.is_some();
        if let Some((name, chunk, prefix)) = open {
            self.add(format!("{prefix}<{name}{chunk}>"));
            self.push_element(indent, name, prefix);
        }

        let child_prefix = indent_prefix(&self.frames);
        let min = min_indent(children);
        let mut traced = false;
        for child in children {
            if child.text.trim().is_empty() {
                self.add(child_prefix.clone());
                continue;
            }
            let rendered = interpolate(&child.text[min..], |t| self.render_inline_tag(t))?;
            if rendered.contains("$(") && !traced {
                self.emit_trace(origin);
                traced = true;
            }
            self.add(format!("{child_prefix}{rendered}"));
        }

        if had_open {
            self.close_one();
        }
        Ok(consumed)
    }
}

// ---- tag grammar ----

enum TagOp {
    Escaped,
    Raw,
}

/// One parsed tag line.
struct ParsedTag {
    /// Element name; empty only for a bare `.` text block.
    name: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<Attribute>,
    /// Expression from `&attributes(expr)`.
    merge_expr: Option<String>,
    /// Explicit `/` suffix.
    self_close: bool,
    op: Option<TagOp>,
    /// Inline content, or the host expression when `op` is set.
    content: Option<String>,
    /// Remainder of a `tag: tag2 …` block expansion.
    expand: Option<String>,
    /// Trailing `.` opening a raw text block.
    dot_block: bool,
}

/// Parse a line against the tag grammar.
///
/// `Ok(None)` means the line is not a tag at all; `Err` carries a detail for
/// an unterminated attribute list.
fn parse_tag(text: &str) -> Result<Option<ParsedTag>, String> {
    let mut tag = ParsedTag {
        name: String::new(),
        id: None,
        classes: Vec::new(),
        attrs: Vec::new(),
        merge_expr: None,
        self_close: false,
        op: None,
        content: None,
        expand: None,
        dot_block: false,
    };

    let mut rest = text;
    if let Some(m) = TAG_NAME.find(rest) {
        tag.name = m.as_str().to_owned();
        rest = &rest[m.end()..];
    }

    let mut shorthand = false;
    while let Some(m) = SHORTHAND.find(rest) {
        shorthand = true;
        let token = m.as_str();
        if let Some(id) = token.strip_prefix('#') {
            tag.id = Some(id.to_owned());
        } else if let Some(class) = token.strip_prefix('.') {
            tag.classes.push(class.to_owned());
        }
        rest = &rest[m.end()..];
    }

    if tag.name.is_empty() && !shorthand {
        if rest == "." {
            tag.dot_block = true;
            return Ok(Some(tag));
        }
        return Ok(None);
    }
    if tag.name.is_empty() {
        tag.name = "div".to_owned();
    }

    if rest.starts_with('(') {
        match balanced(rest, 0, '(', ')') {
            Some((inner, close)) => {
                tag.attrs = split_attributes(inner);
                rest = &rest[close + 1..];
            }
            None => return Err("unterminated attribute list".to_owned()),
        }
    }
    if let Some(after) = rest.strip_prefix("&attributes") {
        if after.starts_with('(') {
            match balanced(rest, "&attributes".len(), '(', ')') {
                Some((inner, close)) => {
                    tag.merge_expr = Some(inner.trim().to_owned());
                    rest = &rest[close + 1..];
                }
                None => return Err("unterminated &attributes list".to_owned()),
            }
        }
    }
    if let Some(after) = rest.strip_prefix('/') {
        tag.self_close = true;
        rest = after;
    }

    if let Some(after) = rest.strip_prefix(':') {
        tag.expand = Some(after.trim_start().to_owned());
        return Ok(Some(tag));
    }
    if let Some(after) = rest.strip_prefix("!=") {
        tag.op = Some(TagOp::Raw);
        tag.content = Some(after.trim().to_owned());
        return Ok(Some(tag));
    }
    if let Some(after) = rest.strip_prefix('=') {
        tag.op = Some(TagOp::Escaped);
        tag.content = Some(after.trim().to_owned());
        return Ok(Some(tag));
    }
    if rest == "." {
        tag.dot_block = true;
        return Ok(Some(tag));
    }
    if let Some(after) = rest.strip_prefix(' ') {
        if !after.is_empty() {
            tag.content = Some(after.to_owned());
        }
        return Ok(Some(tag));
    }
    if rest.is_empty() {
        return Ok(Some(tag));
    }
    Ok(None)
}

// ---- free helpers ----

/// Whether a line can start a tag-shaped construct that joins continuation
/// lines (tags, shorthands, mixin definitions and calls).
fn is_tag_like(text: &str) -> bool {
    text.starts_with("mixin ")
        || text
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '.' | '#' | '+'))
}

/// The lines belonging to a block opened at `indent`, and how many input
/// lines they span (trailing blanks excluded).
fn child_block(rest: &[SourceLine], indent: usize) -> (&[SourceLine], usize) {
    let mut end = 0;
    let mut last = 0;
    while end < rest.len() {
        let text = &rest[end].text;
        if text.trim().is_empty() {
            end += 1;
            continue;
        }
        if indent_of(text) <= indent {
            break;
        }
        end += 1;
        last = end;
    }
    (&rest[..last], last)
}

/// Whether the next non-blank line is nested deeper than `indent`.
fn has_children(rest: &[SourceLine], indent: usize) -> bool {
    rest.iter()
        .find(|l| !l.text.trim().is_empty())
        .is_some_and(|l| indent_of(&l.text) > indent)
}

/// Minimum indent over the non-blank lines of a block.
fn min_indent(lines: &[SourceLine]) -> usize {
    lines
        .iter()
        .filter(|l| !l.text.trim().is_empty())
        .map(|l| indent_of(&l.text))
        .min()
        .unwrap_or(0)
}

/// Escape for a single-quoted host string.
fn single_quote(text: &str) -> String {
    text.replace('\'', "''")
}

/// A filter argument token as a host expression: expressions pass through,
/// bare words are quoted.
fn argument_expr(token: &str) -> String {
    let expression = token.starts_with('$')
        || token.starts_with('(')
        || token.starts_with('\'')
        || token.starts_with('"')
        || token.starts_with('@')
        || token.chars().next().is_some_and(|c| c.is_ascii_digit())
        || token.starts_with('-') && token[1..].chars().next().is_some_and(|c| c.is_ascii_digit());
    if expression {
        token.to_owned()
    } else {
        format!("'{}'", single_quote(token))
    }
}

/// Lower a CamelCase tag name to kebab-case.
fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, ch) in name.char_indices() {
        if ch.is_ascii_uppercase() {
            if idx > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::source::load_str;

    fn generate(template: &str) -> Vec<String> {
        generate_with(template, CompileOptions::default())
    }

    fn generate_with(template: &str, options: CompileOptions) -> Vec<String> {
        let lines = load_str(template, Path::new("<input>"));
        Generator::new(options).generate(&lines).unwrap()
    }

    fn generate_err(template: &str) -> CompileError {
        let lines = load_str(template, Path::new("<input>"));
        Generator::new(CompileOptions::default())
            .generate(&lines)
            .unwrap_err()
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("MyTag"), "my-tag");
        assert_eq!(kebab_case("nav"), "nav");
        assert_eq!(kebab_case("XThing"), "x-thing");
    }

    #[test]
    fn test_simple_tag_with_interpolation() {
        let body = generate("doctype html\np Hello #{$data.name}");
        assert_eq!(
            body,
            vec![
                "$lines.Add('<!DOCTYPE html>')",
                "$script:src_line = 2; $script:src_path = '<input>'",
                "$lines.Add(\"<p>Hello $(out_enc ($data.name))</p>\")",
            ]
        );
    }

    #[test]
    fn test_nested_tags_closed_in_order() {
        let body = generate("html\n  body\n    p hi");
        assert_eq!(
            body,
            vec![
                "$lines.Add(\"<html>\")",
                "$lines.Add(\"`t<body>\")",
                "$lines.Add(\"`t`t<p>hi</p>\")",
                "$lines.Add(\"`t</body>\")",
                "$lines.Add(\"</html>\")",
            ]
        );
    }

    #[test]
    fn test_sibling_closes_previous() {
        let body = generate("div\n  p one\np two");
        assert_eq!(
            body,
            vec![
                "$lines.Add(\"<div>\")",
                "$lines.Add(\"`t<p>one</p>\")",
                "$lines.Add(\"</div>\")",
                "$lines.Add(\"<p>two</p>\")",
            ]
        );
    }

    #[test]
    fn test_void_tag_flag_matrix() {
        assert_eq!(generate("img"), vec!["$lines.Add(\"<img>\")"]);
        let opts = CompileOptions {
            void_self_close: true,
            ..CompileOptions::default()
        };
        assert_eq!(generate_with("img", opts), vec!["$lines.Add(\"<img />\")"]);
    }

    #[test]
    fn test_container_flag_matrix() {
        assert_eq!(generate("div"), vec!["$lines.Add(\"<div></div>\")"]);
        let opts = CompileOptions {
            container_self_close: true,
            ..CompileOptions::default()
        };
        assert_eq!(generate_with("div", opts), vec!["$lines.Add(\"<div />\")"]);
    }

    #[test]
    fn test_explicit_self_close() {
        assert_eq!(generate("part/"), vec!["$lines.Add(\"<part />\")"]);
    }

    #[test]
    fn test_id_and_class_shorthand() {
        assert_eq!(
            generate("#main.a.b text"),
            vec!["$lines.Add(\"<div id=`\"main`\" class=`\"a b`\">text</div>\")"]
        );
    }

    #[test]
    fn test_class_shorthand_merged_with_attribute() {
        let body = generate("div.a.b(class=@('c', 'd'))");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"<div$(out_attr 'class' @('a', 'b', (@('c', 'd'))) $true)></div>\")",
            ]
        );
    }

    #[test]
    fn test_boolean_attribute() {
        assert_eq!(
            generate("input(disabled)"),
            vec!["$lines.Add(\"<input$(out_attr 'disabled' $true $true)>\")"]
        );
    }

    #[test]
    fn test_attribute_escape_operators() {
        let body = generate("a(href=$url title!=$raw)");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"<a$(out_attr 'href' ($url) $true)$(out_attr 'title' ($raw) $false)></a>\")",
            ]
        );
    }

    #[test]
    fn test_style_dictionary_attribute() {
        let body = generate("div(style=@{ backgroundColor = 'red' }) x");
        assert!(
            body[1].contains("$(out_attr 'style' (@{ backgroundColor = 'red' }) $true)"),
            "{body:?}"
        );
    }

    #[test]
    fn test_attributes_merge() {
        let body = generate("div#box.a(title='t')&attributes($extra) x");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"<div$(out_merged_attrs ([ordered]@{'id' = 'box'; 'class' = 'a'; 'title' = ('t')}) ($extra))>x</div>\")",
            ]
        );
    }

    #[test]
    fn test_multiline_attribute_continuation() {
        let body = generate("input(\n  type='text',\n  name='q')\np after");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"<input$(out_attr 'type' ('text') $true)$(out_attr 'name' ('q') $true)>\")",
                "$lines.Add(\"<p>after</p>\")",
            ]
        );
    }

    #[test]
    fn test_unterminated_attribute_reported() {
        let err = generate_err("input(type='text'");
        assert!(matches!(err, CompileError::UnterminatedAttribute(_)));
    }

    #[test]
    fn test_buffered_and_raw_output_lines() {
        let body = generate("= $a\n!= $b");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"$(out_enc ($a))\")",
                "$script:src_line = 2; $script:src_path = '<input>'",
                "$lines.Add(\"$($b)\")",
            ]
        );
    }

    #[test]
    fn test_piped_text() {
        assert_eq!(
            generate("div\n  | plain"),
            vec![
                "$lines.Add(\"<div>\")",
                "$lines.Add(\"`tplain\")",
                "$lines.Add(\"</div>\")",
            ]
        );
    }

    #[test]
    fn test_code_control_flow_opens_and_closes() {
        let body = generate("- foreach ($item in $list)\n  li= $item\np done");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "foreach ($item in $list) {",
                "$script:src_line = 2; $script:src_path = '<input>'",
                "$lines.Add(\"<li>$(out_enc ($item))</li>\")",
                "}",
                "$lines.Add(\"<p>done</p>\")",
            ]
        );
    }

    #[test]
    fn test_explicit_brace_not_auto_closed() {
        let body = generate("- $fn = {\n- }\np x");
        assert_eq!(
            body,
            vec![
                "$fn = {",
                "$script:src_line = 2; $script:src_path = '<input>'",
                "}",
                "$lines.Add(\"<p>x</p>\")",
            ]
        );
    }

    #[test]
    fn test_switch_arms_auto_braced_without_trace() {
        let body = generate("- switch ($x)\n  - 'a'\n    p first\n  - default\n    p other");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "switch ($x) {",
                "'a' {",
                "$lines.Add(\"<p>first</p>\")",
                "}",
                "default {",
                "$lines.Add(\"<p>other</p>\")",
                "}",
                "}",
            ]
        );
    }

    #[test]
    fn test_comment_inside_switch_uses_host_comments() {
        let body = generate("- switch ($x)\n  // arms below\n  - 'a'\n    p first");
        assert_eq!(body[2], "# arms below");
    }

    #[test]
    fn test_raw_code_block() {
        let body = generate("-\n  $a = 1\n  $b = $a + 1\np x");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$a = 1",
                "$b = $a + 1",
                "$lines.Add(\"<p>x</p>\")",
            ]
        );
    }

    #[test]
    fn test_html_comment_inline_and_block() {
        assert_eq!(
            generate("// note"),
            vec!["$lines.Add(\"<!-- note-->\")"]
        );
        let body = generate("//\n  first\n  second");
        assert_eq!(
            body,
            vec![
                "$lines.Add(\"<!--\")",
                "$lines.Add(\"first\")",
                "$lines.Add(\"second\")",
                "$lines.Add(\"-->\")",
            ]
        );
    }

    #[test]
    fn test_silent_comment_skipped() {
        assert_eq!(generate("//- hidden\n  p not rendered"), Vec::<String>::new());
    }

    #[test]
    fn test_literal_html_passthrough() {
        assert_eq!(
            generate("<hr>"),
            vec!["$lines.Add(\"<hr>\")"]
        );
    }

    #[test]
    fn test_doctype_xml_switches_modes() {
        let body = generate("doctype xml\ndoctype plist\nplist(version=\"1.0\")\n  dict");
        assert_eq!(body[0], "$lines.Add('<?xml version=\"1.0\" encoding=\"utf-8\" ?>')");
        assert_eq!(body[1], "$script:pug_properties = $false");
        assert!(body[2].contains("PLIST 1.0"), "{body:?}");
        // Empty container self-closes in XML mode.
        assert!(body.iter().any(|l| l.contains("`t<dict />")), "{body:?}");
        assert!(body.iter().any(|l| l.contains("</plist>")), "{body:?}");
    }

    #[test]
    fn test_kebab_disabled_in_xml_mode() {
        let body = generate("doctype xml\nMyNode");
        assert!(body.iter().any(|l| l.contains("<MyNode />")), "{body:?}");

        let body = generate("MyNode");
        assert!(body.iter().any(|l| l.contains("<my-node></my-node>")), "{body:?}");
    }

    #[test]
    fn test_unknown_doctype_verbatim() {
        assert_eq!(
            generate("doctype custom thing"),
            vec!["$lines.Add('<!DOCTYPE custom thing>')"]
        );
    }

    #[test]
    fn test_mixin_definition_and_call_with_block() {
        let body = generate(
            "mixin card(title)\n  .card\n    h2= $title\n    block\n+card(\"X\")\n  p body",
        );
        assert_eq!(
            body,
            vec![
                "function mixin_card {",
                "param($pug_indent, $title, $block)",
                "$lines.Add(\"$pug_indent<div class=`\"card`\">\")",
                "$script:src_line = 3; $script:src_path = '<input>'",
                "$lines.Add(\"$pug_indent`t<h2>$(out_enc ($title))</h2>\")",
                "if ($null -ne $block) { & $block \"$pug_indent`t\" }",
                "$lines.Add(\"$pug_indent</div>\")",
                "}",
                "$script:src_line = 5; $script:src_path = '<input>'",
                "mixin_card \"\" (\"X\") -block {",
                "param($pug_indent)",
                "$lines.Add(\"$pug_indent<p>body</p>\")",
                "}",
            ]
        );
    }

    #[test]
    fn test_mixin_call_without_block() {
        let body = generate("mixin hr()\n  hr\ndiv\n  +hr()");
        assert!(body.contains(&"mixin_hr \"`t\"".to_owned()), "{body:?}");
    }

    #[test]
    fn test_mixin_default_parameter() {
        let body = generate("mixin tip(kind='info')\n  p= $kind");
        assert_eq!(body[1], "param($pug_indent, $kind = 'info', $block)");
    }

    #[test]
    fn test_block_outside_mixin_is_error() {
        let err = generate_err("div\n  block");
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn test_filter_block() {
        let body = generate(":markdown\n  # Title\n  Body");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"$(markdown (\"# Title`nBody\"))\")",
            ]
        );
    }

    #[test]
    fn test_filter_chain_with_args() {
        let body = generate(":wrap(width=72):trim inline text");
        assert_eq!(
            body,
            vec![
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"$(trim (wrap (\"inline text\") -width 72))\")",
            ]
        );
    }

    #[test]
    fn test_tag_text_block() {
        let body = generate("script.\n  var a = 1;\n  go(a);");
        assert_eq!(
            body,
            vec![
                "$lines.Add(\"<script>\")",
                "$lines.Add(\"`tvar a = 1;\")",
                "$lines.Add(\"`tgo(a);\")",
                "$lines.Add(\"</script>\")",
            ]
        );
    }

    #[test]
    fn test_literal_tag_suppresses_indent() {
        let body = generate("div\n  pre.\n    line one\n      deeper");
        assert_eq!(
            body,
            vec![
                "$lines.Add(\"<div>\")",
                "$lines.Add(\"`t<pre>\")",
                "$lines.Add(\"line one\")",
                "$lines.Add(\"  deeper\")",
                "$lines.Add(\"</pre>\")",
                "$lines.Add(\"</div>\")",
            ]
        );
    }

    #[test]
    fn test_block_expansion() {
        let body = generate("li: a(href='/') home");
        assert_eq!(
            body,
            vec![
                "$lines.Add(\"<li>\")",
                "$script:src_line = 1; $script:src_path = '<input>'",
                "$lines.Add(\"`t<a$(out_attr 'href' ('/') $true)>home</a>\")",
                "$lines.Add(\"</li>\")",
            ]
        );
    }

    #[test]
    fn test_inline_tag_interpolation() {
        let body = generate("p see #[b bold] text");
        assert_eq!(body, vec!["$lines.Add(\"<p>see <b>bold</b> text</p>\")"]);
    }

    #[test]
    fn test_parse_error_with_context() {
        let err = generate_err("p ok\n%broken");
        let CompileError::Parse(msg) = err else {
            panic!("expected parse error, got {err:?}");
        };
        assert!(msg.contains("unrecognized syntax: %broken"));
    }

    #[test]
    fn test_trace_not_duplicated_for_same_line() {
        let body = generate("p= $x");
        let traces = body
            .iter()
            .filter(|l| l.starts_with("$script:src_line"))
            .count();
        assert_eq!(traces, 1);
    }

    #[test]
    fn test_stack_empty_after_generation() {
        // Every opened frame closes even when input ends mid-nesting.
        let body = generate("html\n  body\n    div\n      p deep");
        let closes: Vec<_> = body.iter().filter(|l| l.contains("</")).collect();
        assert_eq!(closes.len(), 4);
        assert_eq!(body.last().unwrap(), "$lines.Add(\"</html>\")");
    }
}
