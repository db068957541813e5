//! `plume build` command implementation.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use plume_config::{CliSettings, Config};

use crate::error::CliError;
use crate::output::Output;

use super::compile_cached;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Template file to transpile.
    pub template: PathBuf,

    /// Write the artifact to this file instead of stdout.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover plume.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default extension for include/extends resolution (overrides config).
    #[arg(long)]
    extension: Option<String>,

    /// Root directory for absolute include paths (overrides config).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Render boolean attributes as attr="attr".
    #[arg(long)]
    no_properties: bool,

    /// Render void tags as <img />.
    #[arg(long)]
    void_self_close: bool,

    /// Render empty containers as <div />.
    #[arg(long)]
    container_self_close: bool,

    /// Keep CamelCase tag names as written.
    #[arg(long)]
    no_kebab_case: bool,

    /// Enable the artifact cache (default: from config).
    #[arg(long)]
    cache: Option<bool>,

    /// Disable the artifact cache.
    #[arg(long, conflicts_with = "cache")]
    no_cache: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl BuildArgs {
    /// The explicit config file path, if one was given.
    pub(crate) fn config_path(&self) -> Option<&std::path::Path> {
        self.config.as_deref()
    }

    /// Build the [`CliSettings`] overrides encoded in these arguments.
    pub(crate) fn cli_settings(&self) -> CliSettings {
        CliSettings {
            extension: self.extension.clone(),
            base_dir: self.base_dir.clone(),
            properties: self.no_properties.then_some(false),
            void_self_close: self.void_self_close.then_some(true),
            container_self_close: self.container_self_close.then_some(true),
            kebab_case: self.no_kebab_case.then_some(false),
            cache_enabled: if self.no_cache { Some(false) } else { self.cache },
        }
    }

    /// Execute the build command.
    pub(crate) fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;
        let options = config.compile_options();

        let compiled = compile_cached(&self.template, &config, &options, version)?;

        match &self.out {
            Some(path) => {
                std::fs::write(path, &compiled.script)?;
                if self.verbose {
                    output.info(&format!("Wrote artifact to {}", path.display()));
                }
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(compiled.script.as_bytes())?;
            }
        }
        Ok(())
    }
}
