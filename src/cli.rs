use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Turnout-vs-distance analysis CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "wahlweg", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the one remote input (population-density WFS layer)
    Fetch(FetchArgs),

    /// Run the full analysis against a data directory
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Data directory the density layer is written into
    #[arg(value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// Overwrite if the file already exists (off by default)
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input data directory (district/station shapefiles, results xlsx,
    /// optionally the fetched density layer)
    #[arg(value_hint = ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// Output directory for plots, tables, and summaries
    #[arg(value_hint = ValueHint::DirPath)]
    pub out_dir: PathBuf,

    /// Replications for the SAR impact simulation
    #[arg(long, default_value_t = crate::model::DEFAULT_IMPACT_REPLICATIONS)]
    pub replications: usize,

    /// Seed for the impact simulation draws (fixed for reproducible runs)
    #[arg(long, default_value_t = 2021)]
    pub seed: u64,
}
