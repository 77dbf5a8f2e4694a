//! Shapefile readers for the two local vector inputs.
//!
//! Field names are the literals of the Berlin open-data exports
//! (EPSG:25833): the district layer carries the combined key in `UWB`;
//! the station layer splits it into `BEZ` + `UWB` and flags postal-only
//! records in `ART` ("B" = Briefwahl).

use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use log::debug;
use shapefile::{dbase::FieldValue, dbase::Record, PolygonRing, Reader, Shape};

use crate::key::StationKey;

use super::{RawDistrict, RawStation};

const DISTRICT_KEY_FIELD: &str = "UWB";
const STATION_BOROUGH_FIELD: &str = "BEZ";
const STATION_UNIT_FIELD: &str = "UWB";
const STATION_KIND_FIELD: &str = "ART";
const POSTAL_KIND: &str = "B";

/// Read the voting-district boundary layer.
pub fn read_districts(path: &Path) -> Result<Vec<RawDistrict>> {
    let items = read_shapes(path)?;
    debug!("districts: {} records from {}", items.len(), path.display());

    items.into_iter().enumerate()
        .map(|(i, (shape, record))| {
            let geometry = shape_to_multipolygon(shape).with_context(|| {
                format!("district dataset: record {i} in {} is not a polygon", path.display())
            })?;
            let key = field_string(&record, DISTRICT_KEY_FIELD)
                .as_deref()
                .and_then(StationKey::from_combined);
            Ok(RawDistrict { key, geometry })
        })
        .collect()
}

/// Read the polling-station point layer.
pub fn read_stations(path: &Path) -> Result<Vec<RawStation>> {
    let items = read_shapes(path)?;
    debug!("stations: {} records from {}", items.len(), path.display());

    items.into_iter().enumerate()
        .map(|(i, (shape, record))| {
            let location = shape_to_point(shape).with_context(|| {
                format!("station dataset: record {i} in {} is not a point", path.display())
            })?;
            let key = match (
                field_string(&record, STATION_BOROUGH_FIELD),
                field_string(&record, STATION_UNIT_FIELD),
            ) {
                (Some(b), Some(u)) => StationKey::from_parts(&b, &u),
                _ => None,
            };
            let postal_only = field_string(&record, STATION_KIND_FIELD)
                .map(|kind| kind.trim() == POSTAL_KIND)
                .unwrap_or(false);
            Ok(RawStation { key, location, postal_only })
        })
        .collect()
}

/// Reads all shapes + attribute records from a given `.shp` file path.
fn read_shapes(path: &Path) -> Result<Vec<(Shape, Record)>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let mut items = Vec::with_capacity(reader.shape_count()?);
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("Error reading shape+record")?;
        items.push((shape, record));
    }
    Ok(items)
}

/// Fetch a dBase field as text, whatever its stored type.
/// Numeric key columns come back without leading zeros; the key
/// normalizer restores them.
fn field_string(record: &Record, name: &str) -> Option<String> {
    match record.get(name)? {
        FieldValue::Character(opt) => opt.clone(),
        FieldValue::Numeric(opt) => opt.map(|v| format!("{}", v as i64)),
        FieldValue::Integer(v) => Some(v.to_string()),
        FieldValue::Float(opt) => opt.map(|v| format!("{}", v as i64)),
        _ => None,
    }
}

fn shape_to_multipolygon(shape: Shape) -> Result<MultiPolygon<f64>> {
    let polygon = match shape {
        Shape::Polygon(p) => p,
        other => bail!("expected Polygon geometry, got {}", other.shapetype()),
    };

    // Shapefile polygons are flat ring lists: each Outer ring opens a new
    // polygon, Inner rings are holes of the last opened one.
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes: Vec<LineString<f64>> = Vec::new();

    let mut close = |exterior: &mut Option<LineString<f64>>, holes: &mut Vec<LineString<f64>>, polygons: &mut Vec<Polygon<f64>>| {
        if let Some(ext) = exterior.take() {
            polygons.push(Polygon::new(ext, std::mem::take(holes)));
        }
    };

    for ring in polygon.rings() {
        match ring {
            PolygonRing::Outer(points) => {
                close(&mut exterior, &mut holes, &mut polygons);
                exterior = Some(ring_to_line_string(points));
            }
            PolygonRing::Inner(points) => {
                holes.push(ring_to_line_string(points));
            }
        }
    }
    close(&mut exterior, &mut holes, &mut polygons);

    if polygons.is_empty() {
        bail!("polygon record has no rings");
    }
    Ok(MultiPolygon(polygons))
}

fn shape_to_point(shape: Shape) -> Result<Point<f64>> {
    match shape {
        Shape::Point(p) => Ok(Point::new(p.x, p.y)),
        Shape::PointM(p) => Ok(Point::new(p.x, p.y)),
        Shape::PointZ(p) => Ok(Point::new(p.x, p.y)),
        other => bail!("expected Point geometry, got {}", other.shapetype()),
    }
}

fn ring_to_line_string(points: &[shapefile::Point]) -> LineString<f64> {
    LineString(points.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
}
