use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};

use crate::cli::AnalyzeArgs;
use crate::common::{ensure_dir_exists, require_dir_exists, require_file_exists};
use crate::{centroid, distance, ingest, merge, model, paths, report, weights};

pub fn run(_cli: &crate::cli::Cli, args: &AnalyzeArgs) -> Result<()> {
    require_dir_exists(&args.data_dir)?;
    ensure_dir_exists(&args.out_dir)?;

    // --- ingest + merge -------------------------------------------------
    let districts_path = paths::districts(&args.data_dir);
    let stations_path = paths::stations(&args.data_dir);
    let results_path = paths::results(&args.data_dir);
    require_file_exists(&districts_path)?;
    require_file_exists(&stations_path)?;
    require_file_exists(&results_path)?;

    let districts = ingest::read_districts(&districts_path)?;
    let stations = ingest::read_stations(&stations_path)?;
    let results = ingest::read_results(&results_path)?;

    let (records, diagnostics) = merge::merge(&districts, &stations, &results)?;
    diagnostics.log();

    // --- geometry: centroids, distances, weights ------------------------
    let geometric = centroid::geometric_centroids(&records)?;
    let baseline_distance = distance::station_distances(&records, &geometric);

    let polygons: Vec<_> = records.iter().map(|r| r.polygon.clone()).collect();
    let spatial_weights = weights::SpatialWeights::contiguity(&polygons)?;

    let mut rng = StdRng::seed_from_u64(args.seed);

    // --- baseline analysis (always runs) --------------------------------
    let baseline = model::analyze_measure(
        "distance to geometric centroid",
        &turnout_of(&records),
        &baseline_distance,
        &spatial_weights,
        args.replications,
        &mut rng,
    )?;
    println!("{baseline}");

    report::write_overview_map(&args.out_dir.join("overview.svg"), &records)?;
    report::write_histogram(
        &args.out_dir.join("hist_distance_centroid.svg"),
        &baseline_distance,
        "Station distance to geometric centroid (m)",
    )?;
    report::write_choropleth(
        &args.out_dir.join("choropleth_distance.svg"),
        &records,
        &baseline_distance,
        "Station distance to geometric centroid (m)",
    )?;

    // --- advanced analysis (needs the fetched density layer) ------------
    let density_path = paths::density_blocks(&args.data_dir);
    let advanced_distance = if density_path.is_file() {
        advanced_or_skip(&args.out_dir, &records, &geometric, &density_path, args, &mut rng)
    } else {
        warn!(
            "density layer {} not found (run `wahlweg fetch` first); \
             skipping the weighted-centroid analysis",
            density_path.display()
        );
        vec![None; records.len()]
    };

    report::write_table(
        &args.out_dir.join("districts.csv"),
        &records,
        &baseline_distance,
        &advanced_distance,
    )?;

    info!("analysis complete; outputs in {}", args.out_dir.display());
    Ok(())
}

fn turnout_of(records: &[merge::DistrictRecord]) -> Vec<f64> {
    records.iter().map(|r| r.turnout).collect()
}

/// A failing advanced branch (corrupt density file, too few covered
/// districts) is fatal for itself only: the baseline results and the
/// district table still land.
fn advanced_or_skip(
    out_dir: &Path,
    records: &[merge::DistrictRecord],
    geometric: &[geo::Point<f64>],
    density_path: &Path,
    args: &AnalyzeArgs,
    rng: &mut StdRng,
) -> Vec<Option<f64>> {
    match run_advanced(out_dir, records, geometric, density_path, args, rng) {
        Ok(distances) => distances,
        Err(err) => {
            warn!("weighted-centroid analysis skipped: {err:#}");
            vec![None; records.len()]
        }
    }
}

/// The weighted-centroid branch: spatial join against the density blocks,
/// second distance measure, second run of the model suite over the covered
/// subset of districts.
fn run_advanced(
    out_dir: &Path,
    records: &[merge::DistrictRecord],
    geometric: &[geo::Point<f64>],
    density_path: &Path,
    args: &AnalyzeArgs,
    rng: &mut StdRng,
) -> Result<Vec<Option<f64>>> {
    let blocks = ingest::read_density_blocks(density_path)
        .context("advanced analysis aborted: density layer unreadable")?;

    let (weighted, coverage) = centroid::weighted_centroids(records, &blocks);
    let advanced_distance = distance::station_distances_opt(records, &weighted);

    // Drop rows without a weighted centroid before regression; the weights
    // structure must be rebuilt over the surviving polygons so the model
    // and its diagnostics see a consistent sample.
    let covered: Vec<usize> = advanced_distance.iter().enumerate()
        .filter_map(|(i, d)| d.map(|_| i))
        .collect();
    info!(
        "advanced model sample: {} of {} districts ({} uncovered)",
        covered.len(),
        records.len(),
        coverage.uncovered
    );

    let subset_records: Vec<_> = covered.iter().map(|&i| records[i].clone()).collect();
    let subset_turnout = turnout_of(&subset_records);
    let subset_distance: Vec<f64> = advanced_distance.iter().filter_map(|d| *d).collect();
    let subset_polygons: Vec<_> = subset_records.iter().map(|r| r.polygon.clone()).collect();
    let subset_weights = weights::SpatialWeights::contiguity(&subset_polygons)?;

    let advanced = model::analyze_measure(
        "distance to population-weighted centroid",
        &subset_turnout,
        &subset_distance,
        &subset_weights,
        args.replications,
        rng,
    )?;
    println!("{advanced}");

    report::write_centroid_map(&out_dir.join("centroids.svg"), records, geometric, &weighted)?;
    report::write_histogram(
        &out_dir.join("hist_distance_weighted.svg"),
        &subset_distance,
        "Station distance to population-weighted centroid (m)",
    )?;

    Ok(advanced_distance)
}
