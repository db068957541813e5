//! Plume CLI - template transpiler.
//!
//! Provides commands for:
//! - `build`: Transpile a template into a host-script artifact
//! - `render`: Transpile, then execute the artifact with a data bag
//! - `deps`: Print a template's transitive file dependencies

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, DepsArgs, RenderArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plume - template transpiler.
#[derive(Parser)]
#[command(name = "plume", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transpile a template into a host-script artifact.
    Build(BuildArgs),
    /// Transpile and execute the artifact with a data bag.
    Render(RenderArgs),
    /// Print a template's transitive file dependencies.
    Deps(DepsArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Build(args) => args.verbose,
        Commands::Render(args) => args.build.verbose,
        Commands::Deps(_) => false,
    };

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Build(args) => args.execute(VERSION),
        Commands::Render(args) => args.execute(VERSION),
        Commands::Deps(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
