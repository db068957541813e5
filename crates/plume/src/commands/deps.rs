//! `plume deps` command implementation.

use std::io::Write;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use clap::Args;
use plume_compiler::compile_file;
use plume_config::Config;

use crate::error::CliError;

/// Arguments for the deps command.
#[derive(Args)]
pub(crate) struct DepsArgs {
    /// Template file to inspect.
    template: PathBuf,

    /// Path to configuration file (default: auto-discover plume.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl DepsArgs {
    /// Execute the deps command: print `mtime<TAB>path` per dependency.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let config = Config::load(self.config.as_deref(), None)?;
        let compiled = compile_file(&self.template, &config.compile_options())?;

        let mut stdout = std::io::stdout().lock();
        for (path, mtime) in &compiled.dependencies {
            let seconds = mtime
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            writeln!(stdout, "{seconds:.3}\t{}", path.display())?;
        }
        Ok(())
    }
}
