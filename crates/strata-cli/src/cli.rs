use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: inspect and verify versioned graph bundles",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Settings file. Defaults to `strata.toml` in the working directory
    /// when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show a bundle's mode, header, and blocks
    Inspect(InspectArgs),
    /// Show the version history stored in a complete bundle
    Log(LogArgs),
    /// Check version signatures in a complete bundle
    Verify(VerifyArgs),
    /// Print the effective settings
    Config,
}

#[derive(Args)]
pub struct InspectArgs {
    pub bundle: PathBuf,
    /// List every block link
    #[arg(long)]
    pub blocks: bool,
}

#[derive(Args)]
pub struct LogArgs {
    pub bundle: PathBuf,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub bundle: PathBuf,
    /// Treat unsigned versions as failures
    #[arg(long)]
    pub require_signatures: bool,
}
