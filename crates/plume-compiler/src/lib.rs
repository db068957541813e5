//! Template-to-script transpiler core.
//!
//! Compiles an indentation-based template language (a Pug dialect) into a
//! self-contained PowerShell script that renders HTML or XML when invoked
//! with a data bag. The pipeline:
//!
//! 1. [`source`]: read the root template into annotated lines.
//! 2. [`resolver`]: expand `extends` inheritance and `include` directives
//!    into one flat line sequence, recording every file opened.
//! 3. [`codegen`]: a single pass over the resolved lines, driven by an
//!    explicit scope stack, emits host-script statements.
//! 4. [`artifact`]: wrap the body in the runtime preamble and the
//!    error-trapping epilogue.
//!
//! The core never executes the artifact; running it (and supplying filter
//! functions) is the caller's concern.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use plume_compiler::{CompileOptions, compile_str};
//!
//! let compiled = compile_str(
//!     "doctype html\np Hello #{$data.name}",
//!     Path::new("<input>"),
//!     &CompileOptions::default(),
//! ).unwrap();
//! assert!(compiled.script.contains("out_enc ($data.name)"));
//! ```

pub mod artifact;
pub mod codegen;
pub mod diagnostics;
mod error;
pub mod interp;
pub mod lex;
pub mod options;
pub mod resolver;
pub mod scope;
pub mod source;

use std::path::Path;

pub use codegen::Generator;
pub use error::CompileError;
pub use options::{CompileOptions, LITERAL_TAGS, VOID_TAGS, doctype};
pub use resolver::Resolver;
pub use source::{DependencyMap, SourceLine};

/// A compiled template artifact plus its file dependency record.
#[derive(Clone, Debug)]
pub struct CompiledTemplate {
    /// The host-script artifact.
    pub script: String,
    /// Every file opened during compilation, with its mtime. External
    /// caches key artifacts by this record.
    pub dependencies: DependencyMap,
}

/// Compile a template file from disk.
pub fn compile_file(
    path: &Path,
    options: &CompileOptions,
) -> Result<CompiledTemplate, CompileError> {
    let mut resolver = Resolver::new(options);
    let lines = resolver.resolve_root(path)?;
    let dependencies = resolver.into_dependencies();
    let body = Generator::new(options.clone()).generate(&lines)?;
    Ok(CompiledTemplate {
        script: artifact::assemble(options, &body),
        dependencies,
    })
}

/// Compile in-memory template content.
///
/// `virtual_path` anchors diagnostics and relative include resolution.
pub fn compile_str(
    content: &str,
    virtual_path: &Path,
    options: &CompileOptions,
) -> Result<CompiledTemplate, CompileError> {
    let mut resolver = Resolver::new(options);
    let lines = resolver.resolve_source(content, virtual_path)?;
    let dependencies = resolver.into_dependencies();
    let body = Generator::new(options.clone()).generate(&lines)?;
    Ok(CompiledTemplate {
        script: artifact::assemble(options, &body),
        dependencies,
    })
}
