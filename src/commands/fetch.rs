use anyhow::Result;
use log::info;

use crate::cli::FetchArgs;
use crate::common::ensure_dir_exists;
use crate::ingest;
use crate::paths;

pub fn run(_cli: &crate::cli::Cli, args: &FetchArgs) -> Result<()> {
    ensure_dir_exists(&args.data_dir)?;

    let out_path = paths::density_blocks(&args.data_dir);
    ingest::fetch_density_blocks(&out_path, args.force)?;

    info!("fetched density layer into {}", out_path.display());
    Ok(())
}
