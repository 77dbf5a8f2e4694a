//! Readers for the four source datasets.
//!
//! Three are local files (district polygons, station points, results
//! spreadsheet); the population-density blocks are fetched once from the
//! Berlin FIS-Broker WFS. Every reader normalizes its key columns into
//! [`StationKey`] form and leaves rows without a valid key as `key: None`,
//! to be counted (not silently lost) by the merge step.

mod results;
mod shapefile;
mod wfs;

pub use results::read_results;
pub use shapefile::{read_districts, read_stations};
pub use wfs::{fetch_density_blocks, read_density_blocks, DENSITY_WFS_URL};

use geo::{MultiPolygon, Point};

use crate::key::StationKey;

/// A voting-district polygon as read from the boundary shapefile.
/// The key column here is the canonical form all other sources join against.
#[derive(Debug, Clone)]
pub struct RawDistrict {
    pub key: Option<StationKey>,
    pub geometry: MultiPolygon<f64>,
}

/// A polling-station point. `postal_only` marks Briefwahl-only records,
/// which have no physical location voters travel to.
#[derive(Debug, Clone)]
pub struct RawStation {
    pub key: Option<StationKey>,
    pub location: Point<f64>,
    pub postal_only: bool,
}

/// One row of the election-results table: registered and actual voters.
#[derive(Debug, Clone)]
pub struct RawResult {
    pub key: Option<StationKey>,
    pub eligible: u64,
    pub cast: u64,
}

/// A population-density block, reduced to what the weighted-centroid
/// computation needs: where its mass sits and how much of it there is.
#[derive(Debug, Clone)]
pub struct DensityBlock {
    pub centroid: Point<f64>,
    pub population: f64,
}
