//! regionc command line: builds hot regions and inspects their inputs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

mod catalog;
mod commands;

#[derive(Parser)]
#[command(name = "regionc")]
#[command(version = regionc_config::VERSION)]
#[command(about = "Profile-guided hot region compiler", long_about = None)]
struct Cli {
    /// TOML configuration file (requires the `toml-config` feature)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Work directory holding the profile, histogram and artifacts
    #[arg(long, global = true)]
    work_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the profile's hot region into a native module
    Build(BuildArgs),

    /// Print the invoke histogram, optionally for one call site
    Histogram(HistogramArgs),

    /// Load the built regions the way the runtime does at startup
    Inspect,
}

#[derive(Args)]
struct BuildArgs {
    /// File with one `<module> <index> <signature>` line per known method
    #[arg(long)]
    catalog: PathBuf,

    /// Directory of pre-generated bitcode, one subdirectory per method
    #[arg(long)]
    bitcode: PathBuf,

    /// Append methods that should have been hot to the profile
    #[arg(long)]
    auto_grow: bool,

    /// Extra flags passed to `opt`
    #[arg(long = "opt-flag", allow_hyphen_values = true)]
    opt_flags: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct HistogramArgs {
    /// Only records whose caller lives in this location
    #[arg(long)]
    location: Option<String>,

    /// Caller method index of the call site
    #[arg(long, requires = "pc")]
    caller: Option<u32>,

    /// Program counter of the call site
    #[arg(long, requires = "caller")]
    pc: Option<u32>,

    /// Print speculation order instead of file order
    #[arg(long)]
    speculate: bool,
}

fn main() -> ExitCode {
    regionc_utils::init_logging(None);
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = commands::load_config(cli.config.as_deref(), cli.work_root)?;
    match cli.command {
        Commands::Build(args) => commands::build(config, &args),
        Commands::Histogram(args) => commands::histogram(&config, &args),
        Commands::Inspect => commands::inspect(&config),
    }
}
