use anyhow::Result;
use clap::Parser;

use wahlweg::cli::{Cli, Commands};
use wahlweg::commands::{analyze, fetch};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match &cli.command {
        Commands::Fetch(args) => fetch::run(&cli, args),
        Commands::Analyze(args) => analyze::run(&cli, args),
    }
}
