//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod deps;
pub(crate) mod render;

pub(crate) use build::BuildArgs;
pub(crate) use deps::DepsArgs;
pub(crate) use render::RenderArgs;

use std::path::Path;

use plume_cache::{ArtifactCache, FileArtifactCache, NullArtifactCache, fingerprint};
use plume_compiler::{CompileOptions, CompiledTemplate, compile_file};
use plume_config::Config;
use tracing::info;

use crate::error::CliError;

/// Compile a template, consulting the artifact cache when enabled.
pub(crate) fn compile_cached(
    template: &Path,
    config: &Config,
    options: &CompileOptions,
    version: &str,
) -> Result<CompiledTemplate, CliError> {
    let cache: Box<dyn ArtifactCache> = if config.cache_resolved.enabled {
        Box::new(FileArtifactCache::new(&config.cache_resolved.dir, version))
    } else {
        Box::new(NullArtifactCache)
    };

    let key = cache_key(template);
    let fp = fingerprint(options);

    if let Some(hit) = cache.get(&key, &fp) {
        info!(template = %template.display(), "using cached artifact");
        return Ok(CompiledTemplate {
            script: hit.script,
            dependencies: plume_compiler::DependencyMap::new(),
        });
    }

    let compiled = compile_file(template, options)?;
    cache.set(&key, &fp, &compiled.script, &compiled.dependencies);
    Ok(compiled)
}

/// Cache key for a template path: path separators and drive colons become
/// safe underscores so keys map onto cache file names.
fn cache_key(template: &Path) -> String {
    template
        .display()
        .to_string()
        .replace(['/', '\\', ':'], "_")
        .trim_start_matches('_')
        .to_owned()
}
