//! Compile-time error types.
//!
//! Variants that point into template source carry a pre-rendered diagnostic
//! (see [`crate::diagnostics`]) so the message a user sees always includes
//! the offending excerpt.

use std::path::PathBuf;

/// Errors surfaced while turning templates into a script artifact.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The root template does not exist.
    #[error("template not found: {0}")]
    TemplateNotFound(PathBuf),

    /// An `include` target could not be resolved, even after extension retry.
    #[error("{0}")]
    IncludeNotFound(String),

    /// An `extends` target could not be resolved, even after extension retry.
    #[error("{0}")]
    ExtendsNotFound(String),

    /// A template appears in its own inheritance chain.
    #[error("{0}")]
    CyclicExtends(String),

    /// A line fits no rule of the generator's dispatch table.
    #[error("{0}")]
    Parse(String),

    /// An attribute list never balanced, even after joining continuation
    /// lines.
    #[error("{0}")]
    UnterminatedAttribute(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
