//! `plume render` command implementation.
//!
//! The core never executes an artifact; this command hands it to an
//! external `pwsh` process together with the JSON data bag and an optional
//! filters file, then maps any annotated runtime failure back through the
//! compiler's diagnostic formatter.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::Args;
use plume_compiler::diagnostics;
use plume_config::Config;

use crate::error::CliError;
use crate::output::Output;

use super::{BuildArgs, compile_cached};

/// Marker prefix the driver prints for annotated runtime failures.
const ERROR_MARKER: &str = "PLUME-ERROR|";

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// JSON data bag passed to the artifact.
    #[arg(short, long, default_value = "{}")]
    data: String,

    /// Host-script file defining filter functions, dot-sourced before
    /// the artifact runs.
    #[arg(long)]
    filters: Option<PathBuf>,
}

impl RenderArgs {
    /// Execute the render command.
    pub(crate) fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.build.config_path(), Some(&self.build.cli_settings()))?;
        let options = config.compile_options();

        let compiled = compile_cached(&self.build.template, &config, &options, version)?;

        let work = WorkFiles::paths();
        std::fs::write(&work.artifact, &compiled.script)?;
        std::fs::write(&work.driver, self.driver_script(&work.artifact)?)?;
        let result = run_pwsh(&work.driver);
        work.cleanup();

        match result {
            Ok(rendered) => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                Ok(())
            }
            Err(RunError::Spawn(err)) => Err(CliError::Render(format!(
                "failed to start pwsh (is PowerShell installed?): {err}"
            ))),
            Err(RunError::Failed(stderr)) => {
                if let Some((line, path, detail)) = parse_error_marker(&stderr) {
                    output.error(&diagnostics::annotate(
                        Path::new(&path),
                        line,
                        &detail,
                        options.error_context,
                    ));
                    Err(CliError::Render("render failed".to_owned()))
                } else {
                    Err(CliError::Render(stderr.trim().to_owned()))
                }
            }
        }
    }

    /// Build the driver script that loads filters, decodes the data bag,
    /// runs the artifact and surfaces annotated failures.
    fn driver_script(&self, artifact: &Path) -> Result<String, CliError> {
        if self.data.lines().any(|l| l.starts_with("'@")) {
            return Err(CliError::Render(
                "data JSON may not contain a line starting with '@".to_owned(),
            ));
        }

        let mut script = String::new();
        script.push_str("$ErrorActionPreference = 'Stop'\n");
        if let Some(filters) = &self.filters {
            script.push_str(&format!(". '{}'\n", quote_path(filters)));
        }
        script.push_str("$data = @'\n");
        script.push_str(&self.data);
        script.push_str("\n'@ | ConvertFrom-Json -AsHashtable\n");
        script.push_str("try {\n");
        script.push_str(&format!("    $html = & '{}' $data\n", quote_path(artifact)));
        script.push_str("    [Console]::Out.WriteLine($html)\n");
        script.push_str("}\n");
        script.push_str("catch {\n");
        script.push_str("    $ex = $_.Exception\n");
        script.push_str(&format!(
            "    [Console]::Error.WriteLine(\"{ERROR_MARKER}$($ex.Data['PugLine'])|$($ex.Data['PugPath'])\")\n"
        ));
        script.push_str("    [Console]::Error.WriteLine($ex.Message)\n");
        script.push_str("    exit 1\n");
        script.push_str("}\n");
        Ok(script)
    }
}

/// Escape a path for a single-quoted host string.
fn quote_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

/// Temp files handed to the `pwsh` subprocess.
struct WorkFiles {
    artifact: PathBuf,
    driver: PathBuf,
}

impl WorkFiles {
    fn paths() -> Self {
        let dir = std::env::temp_dir();
        let pid = std::process::id();
        Self {
            artifact: dir.join(format!("plume-{pid}-artifact.ps1")),
            driver: dir.join(format!("plume-{pid}-driver.ps1")),
        }
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.artifact);
        let _ = std::fs::remove_file(&self.driver);
    }
}

enum RunError {
    Spawn(std::io::Error),
    Failed(String),
}

/// Run the driver under `pwsh` and return its stdout.
fn run_pwsh(driver: &Path) -> Result<String, RunError> {
    let result = Command::new("pwsh")
        .args(["-NoProfile", "-NonInteractive", "-File"])
        .arg(driver)
        .output()
        .map_err(RunError::Spawn)?;

    if result.status.success() {
        Ok(String::from_utf8_lossy(&result.stdout).into_owned())
    } else {
        Err(RunError::Failed(
            String::from_utf8_lossy(&result.stderr).into_owned(),
        ))
    }
}

/// Parse `PLUME-ERROR|<line>|<path>` plus the detail lines that follow.
fn parse_error_marker(stderr: &str) -> Option<(u32, String, String)> {
    let mut lines = stderr.lines();
    let marker = lines.find(|l| l.starts_with(ERROR_MARKER))?;
    let mut parts = marker[ERROR_MARKER.len()..].splitn(2, '|');
    let line = parts.next()?.parse().ok()?;
    let path = parts.next()?.to_owned();
    let detail = lines.collect::<Vec<_>>().join("\n");
    Some((line, path, detail))
}
