//! The generator's open-frame stack.
//!
//! Frames are keyed by source indent and strictly increase from bottom to
//! top. Whenever a line arrives at or shallower than the top frame's indent,
//! frames are popped and their closing fragments emitted until the invariant
//! holds again. Every pop emits; there is no early-exit path that skips a
//! closing tag or brace.

/// What an open frame is waiting to close.
#[derive(Clone, Debug)]
pub enum FrameKind {
    /// An open element awaiting children.
    Element {
        tag: String,
        is_void: bool,
        /// Tag is in the literal set; descendants render unindented.
        is_literal: bool,
        /// Indent prefix the opening tag was emitted with, reused for the
        /// closing tag.
        prefix: String,
    },
    /// A host-language control-flow frame opened by the template.
    Code {
        is_switch: bool,
        /// The template supplied its own `{`; the author closes it too.
        is_explicit_brace: bool,
    },
    /// A mixin definition body or a mixin-call-with-body scriptblock.
    Mixin { is_definition: bool },
}

/// One open scope.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Source indent of the line that opened the frame.
    pub indent: usize,
    pub kind: FrameKind,
}

impl Frame {
    #[must_use]
    pub fn new(indent: usize, kind: FrameKind) -> Self {
        Self { indent, kind }
    }

    /// Whether this frame is an open `switch` statement.
    #[must_use]
    pub fn is_switch(&self) -> bool {
        matches!(self.kind, FrameKind::Code { is_switch: true, .. })
    }
}

/// Render-time indent prefix for the current stack, as double-quoted host
/// string content.
///
/// Counts open element frames only. Inside a literal-tag ancestor the prefix
/// is empty; inside a mixin body it is the caller's `$pug_indent` plus one
/// tab per element frame above the mixin, so call-site indentation carries
/// into expanded bodies.
#[must_use]
pub fn indent_prefix(frames: &[Frame]) -> String {
    let literal = frames
        .iter()
        .any(|f| matches!(&f.kind, FrameKind::Element { is_literal: true, .. }));
    if literal {
        return String::new();
    }

    let mut tabs = 0usize;
    for frame in frames.iter().rev() {
        match &frame.kind {
            FrameKind::Element { .. } => tabs += 1,
            FrameKind::Mixin { .. } => {
                return format!("$pug_indent{}", "`t".repeat(tabs));
            }
            FrameKind::Code { .. } => {}
        }
    }
    "`t".repeat(tabs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(indent: usize, tag: &str, literal: bool) -> Frame {
        Frame::new(
            indent,
            FrameKind::Element {
                tag: tag.to_owned(),
                is_void: false,
                is_literal: literal,
                prefix: String::new(),
            },
        )
    }

    #[test]
    fn test_prefix_counts_elements_only() {
        let frames = vec![
            element(0, "html", false),
            Frame::new(2, FrameKind::Code { is_switch: false, is_explicit_brace: false }),
            element(4, "body", false),
        ];
        assert_eq!(indent_prefix(&frames), "`t`t");
    }

    #[test]
    fn test_prefix_empty_inside_literal_ancestor() {
        let frames = vec![element(0, "div", false), element(2, "pre", true)];
        assert_eq!(indent_prefix(&frames), "");
    }

    #[test]
    fn test_prefix_relative_inside_mixin() {
        let frames = vec![
            element(0, "main", false),
            Frame::new(2, FrameKind::Mixin { is_definition: true }),
            element(4, "div", false),
        ];
        assert_eq!(indent_prefix(&frames), "$pug_indent`t");
    }

    #[test]
    fn test_prefix_empty_stack() {
        assert_eq!(indent_prefix(&[]), "");
    }
}
