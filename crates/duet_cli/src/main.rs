//! Duet CLI: differential post-processing of emitted bundles.
//!
//! Provides `duet process` to generate downlevel bundles next to the modern
//! ones, and `duet cache` to inspect or clear the artifact cache.

#![warn(missing_docs)]

mod cache;
mod process;
mod project;

use std::process as proc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Duet: differential bundle post-processor.
#[derive(Parser, Debug)]
#[command(name = "duet", version, about = "Differential bundle post-processor")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `duet.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate downlevel bundles for the emitted files.
    Process(ProcessArgs),
    /// Inspect or clear the artifact cache.
    Cache {
        /// The cache operation.
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// Arguments for the `duet process` subcommand.
#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// JSON list of emitted files. When omitted, `*.js` and `*.css` files are
    /// discovered in the output path.
    #[arg(long)]
    pub manifest: Option<String>,

    /// Directory holding the emitted bundles.
    #[arg(long)]
    pub output_path: Option<String>,

    /// Minify outputs.
    #[arg(long, overrides_with = "no_optimize")]
    pub optimize: bool,

    /// Do not minify outputs.
    #[arg(long, overrides_with = "optimize")]
    pub no_optimize: bool,

    /// Generate source maps.
    #[arg(long)]
    pub source_maps: bool,

    /// Generate source maps without referencing them from the code.
    #[arg(long)]
    pub hidden_source_maps: bool,

    /// Input maps include vendor sources.
    #[arg(long)]
    pub vendor_source_maps: bool,

    /// Transform every bundle, bypassing the artifact cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Number of transform workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Print the resulting file lists as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Cache operations.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheCommand {
    /// Show entry counts and sizes.
    Stats,
    /// Remove every cached artifact.
    Clean,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Process(ref args) => process::run(args, &global),
        Command::Cache { ref command } => cache::run(command, &global),
    };

    match result {
        Ok(code) => proc::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            proc::exit(1);
        }
    }
}

/// Installs the log subscriber. `RUST_LOG` takes precedence over the flags.
fn init_logging(quiet: bool, verbose: bool) {
    let default = if quiet {
        "duet=warn"
    } else if verbose {
        "duet=debug"
    } else {
        "duet=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_process_default() {
        let cli = Cli::parse_from(["duet", "process"]);
        match cli.command {
            Command::Process(ref args) => {
                assert!(args.manifest.is_none());
                assert!(args.output_path.is_none());
                assert!(!args.optimize);
                assert!(!args.no_optimize);
                assert!(!args.source_maps);
                assert!(!args.no_cache);
                assert!(args.workers.is_none());
                assert!(!args.json);
            }
            _ => panic!("expected Process command"),
        }
    }

    #[test]
    fn parse_process_with_args() {
        let cli = Cli::parse_from([
            "duet",
            "process",
            "--manifest",
            "emitted.json",
            "--output-path",
            "dist",
            "--no-optimize",
            "--source-maps",
            "--hidden-source-maps",
            "--workers",
            "3",
            "--json",
        ]);
        match cli.command {
            Command::Process(ref args) => {
                assert_eq!(args.manifest.as_deref(), Some("emitted.json"));
                assert_eq!(args.output_path.as_deref(), Some("dist"));
                assert!(args.no_optimize);
                assert!(args.source_maps);
                assert!(args.hidden_source_maps);
                assert_eq!(args.workers, Some(3));
                assert!(args.json);
            }
            _ => panic!("expected Process command"),
        }
    }

    #[test]
    fn parse_cache_commands() {
        let cli = Cli::parse_from(["duet", "cache", "stats"]);
        assert!(matches!(
            cli.command,
            Command::Cache {
                command: CacheCommand::Stats
            }
        ));
        let cli = Cli::parse_from(["duet", "cache", "clean"]);
        assert!(matches!(
            cli.command,
            Command::Cache {
                command: CacheCommand::Clean
            }
        ));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["duet", "--quiet", "--config", "ci/duet.toml", "process"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("ci/duet.toml"));
    }

    #[test]
    fn parse_verbose_flag_after_subcommand() {
        let cli = Cli::parse_from(["duet", "cache", "stats", "--verbose"]);
        assert!(cli.verbose);
    }
}
