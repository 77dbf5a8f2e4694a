//! Rendered outputs: maps, histograms, and the merged analysis table.

mod svg;

use std::{fs::File, io::{BufWriter, Write}, path::Path};

use anyhow::{Context, Result};
use geo::{MultiPolygon, Point};
use log::info;
use polars::prelude::*;

use crate::merge::DistrictRecord;

use self::svg::*;

const MAP_SIZE: f64 = 900.0;
const MAP_MARGIN: f64 = 20.0;
const HIST_WIDTH: f64 = 640.0;
const HIST_HEIGHT: f64 = 400.0;
const HIST_BINS: usize = 30;

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("[report] failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn polygons_of(records: &[DistrictRecord]) -> Vec<MultiPolygon<f64>> {
    records.iter().map(|r| r.polygon.clone()).collect()
}

/// Overview map: district polygons with their polling stations.
pub fn write_overview_map(path: &Path, records: &[DistrictRecord]) -> Result<()> {
    let polygons = polygons_of(records);
    let stations: Vec<Point<f64>> = records.iter().map(|r| r.station).collect();
    let project = projection_for(bounds_of(&polygons)?, MAP_SIZE, MAP_SIZE, MAP_MARGIN);

    let mut writer = create(path)?;
    write_svg_header(&mut writer, MAP_SIZE, MAP_SIZE)?;
    write_svg_styles(&mut writer)?;
    draw_polygons(&mut writer, &polygons, &project)?;
    draw_points(&mut writer, &stations, "stn", 1.6, &project)?;
    draw_title(&mut writer, "Voting districts and polling stations", MAP_MARGIN, 14.0)?;
    write_svg_footer(&mut writer)?;

    info!("[report] wrote {}", path.display());
    Ok(())
}

/// Choropleth of a per-district value (here: station distance in meters).
pub fn write_choropleth(
    path: &Path,
    records: &[DistrictRecord],
    values: &[f64],
    title: &str,
) -> Result<()> {
    let polygons = polygons_of(records);
    let project = projection_for(bounds_of(&polygons)?, MAP_SIZE, MAP_SIZE, MAP_MARGIN);

    let (lo, hi) = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(*v), hi.max(*v))
    });
    let span = (hi - lo).max(f64::EPSILON);
    let colors: Vec<String> = values.iter()
        .map(|v| sequential_color((v - lo) / span).to_string())
        .collect();

    let mut writer = create(path)?;
    write_svg_header(&mut writer, MAP_SIZE, MAP_SIZE)?;
    write_svg_styles(&mut writer)?;
    draw_polygons_with_fill(&mut writer, &polygons, &colors, &project)?;
    draw_title(&mut writer, title, MAP_MARGIN, 14.0)?;
    write_svg_footer(&mut writer)?;

    info!("[report] wrote {}", path.display());
    Ok(())
}

/// Centroid-comparison map: geometric vs population-weighted centroid per
/// district, each connected to its polling station.
pub fn write_centroid_map(
    path: &Path,
    records: &[DistrictRecord],
    geometric: &[Point<f64>],
    weighted: &[Option<Point<f64>>],
) -> Result<()> {
    let polygons = polygons_of(records);
    let project = projection_for(bounds_of(&polygons)?, MAP_SIZE, MAP_SIZE, MAP_MARGIN);

    let stations: Vec<Point<f64>> = records.iter().map(|r| r.station).collect();
    let weighted_points: Vec<Point<f64>> = weighted.iter().flatten().copied().collect();
    let mut edges: Vec<(Point<f64>, Point<f64>)> = Vec::new();
    for (i, record) in records.iter().enumerate() {
        edges.push((record.station, geometric[i]));
        if let Some(w) = weighted[i] {
            edges.push((record.station, w));
        }
    }

    let mut writer = create(path)?;
    write_svg_header(&mut writer, MAP_SIZE, MAP_SIZE)?;
    write_svg_styles(&mut writer)?;
    draw_polygons(&mut writer, &polygons, &project)?;
    draw_edges(&mut writer, &edges, &project)?;
    draw_points(&mut writer, &stations, "stn", 1.6, &project)?;
    draw_points(&mut writer, geometric, "ctr", 1.3, &project)?;
    draw_points(&mut writer, &weighted_points, "wct", 1.3, &project)?;
    draw_title(
        &mut writer,
        "Geometric (red) vs population-weighted (green) centroids",
        MAP_MARGIN,
        14.0,
    )?;
    write_svg_footer(&mut writer)?;

    info!("[report] wrote {}", path.display());
    Ok(())
}

/// Density histogram of a distance measure.
pub fn write_histogram(path: &Path, values: &[f64], title: &str) -> Result<()> {
    anyhow::ensure!(!values.is_empty(), "[report] histogram of an empty vector");

    let (lo, hi) = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(*v), hi.max(*v))
    });
    let span = (hi - lo).max(f64::EPSILON);

    let mut counts = vec![0usize; HIST_BINS];
    for v in values {
        let bin = (((v - lo) / span) * HIST_BINS as f64) as usize;
        counts[bin.min(HIST_BINS - 1)] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(1).max(1) as f64;

    let margin = 40.0;
    let plot_w = HIST_WIDTH - 2.0 * margin;
    let plot_h = HIST_HEIGHT - 2.0 * margin;
    let bar_w = plot_w / HIST_BINS as f64;

    let mut writer = create(path)?;
    write_svg_header(&mut writer, HIST_WIDTH, HIST_HEIGHT)?;
    write_svg_styles(&mut writer)?;
    for (i, count) in counts.iter().enumerate() {
        let h = plot_h * *count as f64 / max_count;
        let x = margin + i as f64 * bar_w;
        let y = margin + plot_h - h;
        writeln!(
            writer,
            r#"<rect class="bar" x="{x:.2}" y="{y:.2}" width="{:.2}" height="{h:.2}"/>"#,
            bar_w * 0.9,
        )?;
    }
    // Axis line and range labels.
    writeln!(
        writer,
        r#"<line class="axis" x1="{margin}" y1="{y}" x2="{x2}" y2="{y}"/>"#,
        y = margin + plot_h,
        x2 = margin + plot_w,
    )?;
    draw_title(&mut writer, title, margin, 20.0)?;
    draw_title(&mut writer, &format!("{lo:.0} m"), margin, margin + plot_h + 16.0)?;
    draw_title(&mut writer, &format!("{hi:.0} m"), margin + plot_w - 40.0, margin + plot_h + 16.0)?;
    write_svg_footer(&mut writer)?;

    info!("[report] wrote {}", path.display());
    Ok(())
}

/// The merged analysis table as CSV, for inspection outside the pipeline.
pub fn write_table(
    path: &Path,
    records: &[DistrictRecord],
    geometric_distance: &[f64],
    weighted_distance: &[Option<f64>],
) -> Result<()> {
    let mut df = df![
        "key" => records.iter().map(|r| r.key.as_str().to_string()).collect::<Vec<_>>(),
        "eligible" => records.iter().map(|r| r.eligible as i64).collect::<Vec<_>>(),
        "cast" => records.iter().map(|r| r.cast as i64).collect::<Vec<_>>(),
        "turnout_pct" => records.iter().map(|r| r.turnout).collect::<Vec<_>>(),
        "dist_centroid_m" => geometric_distance.to_vec(),
        "dist_weighted_m" => weighted_distance.to_vec(),
    ]?;

    let file = File::create(path)
        .with_context(|| format!("[report] failed to create {}", path.display()))?;
    CsvWriter::new(BufWriter::new(file)).finish(&mut df)?;

    info!("[report] wrote {}", path.display());
    Ok(())
}
