use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "eqforge",
    about = "Assemble equivariant interatomic-potential models from configuration",
    version,
    author,
    before_help = crate::display::banner_for_help(),
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub output: OutputOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the model builders listed in a configuration file
    #[command(visible_alias = "b")]
    Build(BuildArgs),

    /// List the registered model builders and layers
    #[command(visible_alias = "ls")]
    Builders,
}

/// Output options shared by all commands.
#[derive(Args)]
pub struct OutputOptions {
    /// Suppress banner, progress, and tables (for scripting)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log each builder step, layer, and resolved parameter
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Model configuration (TOML)
    #[arg(value_name = "CONFIG", required_unless_present = "example")]
    pub config: Option<PathBuf>,

    /// Use the bundled example configuration
    #[arg(long, conflicts_with = "config")]
    pub example: bool,

    /// Initialize layer weights
    #[arg(long)]
    pub initialize: bool,

    /// Build the model for inference
    #[arg(long)]
    pub deploy: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
