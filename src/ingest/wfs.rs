//! Population-density blocks from the Berlin FIS-Broker WFS.
//!
//! This is the single remote input of the pipeline. The fetch goes through
//! [`crate::common::fetch_to_file`] (timeout + bounded retries + atomic
//! write); parsing then happens against the local copy, so `analyze` never
//! touches the network. A missing or failed fetch disables only the
//! weighted-centroid branch of the analysis.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use geo::{Centroid, Coord, LineString, MultiPolygon, Point, Polygon};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use crate::common::{fetch_to_file, Wgs84ToUtm33};

use super::DensityBlock;

/// GetFeature query for the residential-density block layer (EW = Einwohner).
pub const DENSITY_WFS_URL: &str = "https://fbinter.stadt-berlin.de/fb/wfs/data/senstadt/s06_06ewdichte2021?service=WFS&version=2.0.0&request=GetFeature&typeNames=fis:s06_06ewdichte2021&outputFormat=application/json";

/// Population-count property, with the spellings seen in FIS-Broker exports.
const POPULATION_FIELDS: &[&str] = &["ew2021", "EW", "ew"];

/// Download the density layer to `out_path`.
pub fn fetch_density_blocks(out_path: &Path, force: bool) -> Result<()> {
    info!("fetching density blocks from FIS-Broker WFS");
    fetch_to_file(DENSITY_WFS_URL, out_path, force)
        .context("density dataset: WFS fetch failed")
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Value,
}

/// Parse the downloaded GeoJSON into density blocks: one centroid + one
/// population count per block. Blocks in geographic coordinates are
/// reprojected into UTM 33N so the later point-in-polygon tests run in the
/// same CRS as the district polygons.
pub fn read_density_blocks(path: &Path) -> Result<Vec<DensityBlock>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("density dataset: failed to read {}", path.display()))?;
    let collection: FeatureCollection = serde_json::from_str(&text)
        .with_context(|| format!("density dataset: {} is not a feature collection", path.display()))?;

    let reproject = Wgs84ToUtm33::new()?;
    let mut blocks = Vec::with_capacity(collection.features.len());

    for (i, feature) in collection.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else { continue };
        let mut shape = geometry_to_multipolygon(&geometry)
            .with_context(|| format!("density dataset: feature {i} has bad geometry"))?;

        if looks_geographic(&shape) {
            shape = reproject_multipolygon(&reproject, &shape)
                .with_context(|| format!("density dataset: feature {i} failed to reproject"))?;
        }

        let population = population_of(&feature.properties)
            .with_context(|| format!("density dataset: feature {i} has no population field"))?;

        let Some(centroid) = shape.centroid() else {
            debug!("density dataset: feature {i} is degenerate, skipped");
            continue;
        };

        blocks.push(DensityBlock { centroid, population });
    }

    info!("density blocks: {} parsed from {}", blocks.len(), path.display());
    Ok(blocks)
}

fn population_of(properties: &serde_json::Map<String, Value>) -> Result<f64> {
    for field in POPULATION_FIELDS {
        if let Some(value) = properties.get(*field).and_then(Value::as_f64) {
            if value.is_finite() && value >= 0.0 {
                return Ok(value);
            }
        }
    }
    bail!("none of {POPULATION_FIELDS:?} present and numeric")
}

/// Heuristic CRS sniff: UTM eastings/northings are far outside the degree
/// domain, so a bounding coordinate inside it means lon/lat.
fn looks_geographic(shape: &MultiPolygon<f64>) -> bool {
    shape.0.iter()
        .flat_map(|p| p.exterior().coords())
        .all(|c| c.x.abs() <= 180.0 && c.y.abs() <= 90.0)
}

fn reproject_multipolygon(tf: &Wgs84ToUtm33, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    let reproject_ring = |ring: &LineString<f64>| -> Result<LineString<f64>> {
        ring.coords()
            .map(|c| tf.apply(*c))
            .collect::<Result<Vec<_>>>()
            .map(LineString::from)
    };

    let polygons = shape.0.iter()
        .map(|polygon| {
            let exterior = reproject_ring(polygon.exterior())?;
            let interiors = polygon.interiors().iter()
                .map(reproject_ring)
                .collect::<Result<Vec<_>>>()?;
            Ok(Polygon::new(exterior, interiors))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MultiPolygon(polygons))
}

fn geometry_to_multipolygon(geometry: &Geometry) -> Result<MultiPolygon<f64>> {
    match geometry.kind.as_str() {
        "Polygon" => Ok(MultiPolygon(vec![parse_polygon(&geometry.coordinates)?])),
        "MultiPolygon" => {
            let parts = geometry.coordinates.as_array()
                .ok_or_else(|| anyhow!("MultiPolygon coordinates are not an array"))?;
            let polygons = parts.iter().map(parse_polygon).collect::<Result<Vec<_>>>()?;
            Ok(MultiPolygon(polygons))
        }
        other => bail!("unexpected geometry type: {other}"),
    }
}

fn parse_polygon(coordinates: &Value) -> Result<Polygon<f64>> {
    let rings = coordinates.as_array()
        .ok_or_else(|| anyhow!("Polygon coordinates are not an array"))?;
    let mut parsed = rings.iter().map(parse_ring);

    let exterior = parsed.next()
        .ok_or_else(|| anyhow!("Polygon has no rings"))??;
    let interiors = parsed.collect::<Result<Vec<_>>>()?;

    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(ring: &Value) -> Result<LineString<f64>> {
    let positions = ring.as_array()
        .ok_or_else(|| anyhow!("ring is not an array"))?;
    let coords = positions.iter()
        .map(|pos| {
            let pair = pos.as_array()
                .ok_or_else(|| anyhow!("position is not an array"))?;
            let x = pair.first().and_then(Value::as_f64)
                .ok_or_else(|| anyhow!("position has no x"))?;
            let y = pair.get(1).and_then(Value::as_f64)
                .ok_or_else(|| anyhow!("position has no y"))?;
            Ok(Coord { x, y })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString(coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "ew2021": 420 },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[389000.0, 5820000.0], [389100.0, 5820000.0],
                                     [389100.0, 5820100.0], [389000.0, 5820100.0],
                                     [389000.0, 5820000.0]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "ew2021": null },
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn parses_projected_blocks_without_reprojection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.geojson");
        std::fs::write(&path, BLOCK).unwrap();

        let blocks = read_density_blocks(&path).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].population, 420.0);
        assert!((blocks[0].centroid.x() - 389050.0).abs() < 1e-6);
        assert!((blocks[0].centroid.y() - 5820050.0).abs() < 1e-6);
    }

    #[test]
    fn missing_population_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.geojson");
        std::fs::write(&path, BLOCK.replace("ew2021", "unrelated")).unwrap();

        let err = read_density_blocks(&path).unwrap_err();
        assert!(format!("{err:#}").contains("population"));
    }
}
