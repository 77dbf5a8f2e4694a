//! The two centroid variants a district can be measured against.
//!
//! The geometric centroid is the plain area centroid of the district
//! polygon. The population-weighted centroid assigns every density-block
//! centroid to its containing district with an R-tree candidate pass, then
//! folds a running weighted sum per district key.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use geo::{BoundingRect, Centroid, Contains, Point, Rect};
use log::{info, warn};
use rstar::{RTree, RTreeObject, AABB};

use crate::ingest::DensityBlock;
use crate::merge::DistrictRecord;

/// Area centroid per district, in record order.
/// A degenerate polygon is a hard error naming the offending key.
pub fn geometric_centroids(records: &[DistrictRecord]) -> Result<Vec<Point<f64>>> {
    records.iter()
        .map(|record| {
            record.polygon.centroid().ok_or_else(|| {
                anyhow!("district dataset: degenerate polygon for key {}", record.key)
            })
        })
        .collect()
}

/// Index entry for the district R-tree: bounding box + record index.
#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize,
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Coverage report for the weighted-centroid spatial join.
#[derive(Debug, Clone, Default)]
pub struct CentroidCoverage {
    /// Districts that received at least one block.
    pub covered: usize,
    /// Districts with no intersecting block (excluded from the advanced model).
    pub uncovered: usize,
    /// Blocks whose centroid fell inside no district.
    pub orphan_blocks: usize,
}

/// Population-weighted centroid per district, in record order; `None` where
/// no block centroid falls inside the district polygon.
///
/// Grouping is by key (via the record index), so a district split into
/// disjoint block clusters still folds into a single centroid:
/// (Σpᵢxᵢ/Σpᵢ, Σpᵢyᵢ/Σpᵢ).
pub fn weighted_centroids(
    records: &[DistrictRecord],
    blocks: &[DensityBlock],
) -> (Vec<Option<Point<f64>>>, CentroidCoverage) {
    let rtree = RTree::bulk_load(
        records.iter().enumerate()
            .filter_map(|(i, record)| {
                record.polygon.bounding_rect().map(|bbox| BoundingBox { idx: i, bbox })
            })
            .collect(),
    );

    // Running (Σp·x, Σp·y, Σp) per district index.
    let mut folds: HashMap<usize, (f64, f64, f64)> = HashMap::new();
    let mut coverage = CentroidCoverage::default();

    for block in blocks {
        let pt = block.centroid;
        let envelope = AABB::from_corners([pt.x(), pt.y()], [pt.x(), pt.y()]);

        let parent = rtree
            .locate_in_envelope_intersecting(&envelope)
            .map(|bb| bb.idx)
            .find(|&i| records[i].polygon.contains(&pt));

        match parent {
            Some(i) => {
                let fold = folds.entry(i).or_insert((0.0, 0.0, 0.0));
                fold.0 += block.population * pt.x();
                fold.1 += block.population * pt.y();
                fold.2 += block.population;
            }
            None => coverage.orphan_blocks += 1,
        }
    }

    let centroids = records.iter().enumerate()
        .map(|(i, _)| match folds.get(&i) {
            Some(&(sx, sy, sp)) if sp > 0.0 => Some(Point::new(sx / sp, sy / sp)),
            // Zero total population degenerates the same way as no blocks.
            _ => None,
        })
        .collect::<Vec<_>>();

    coverage.covered = centroids.iter().filter(|c| c.is_some()).count();
    coverage.uncovered = centroids.len() - coverage.covered;

    info!(
        "weighted centroids: {}/{} districts covered ({} orphan blocks)",
        coverage.covered,
        centroids.len(),
        coverage.orphan_blocks
    );
    if coverage.uncovered > 0 {
        warn!(
            "weighted centroids: {} districts have no density blocks and leave the advanced model",
            coverage.uncovered
        );
    }

    (centroids, coverage)
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use geo::MultiPolygon;

    use super::*;
    use crate::key::StationKey;

    fn record(key: &str, x: f64, y: f64, size: f64) -> DistrictRecord {
        DistrictRecord {
            key: StationKey::from_combined(key).unwrap(),
            polygon: MultiPolygon(vec![polygon![
                (x: x, y: y),
                (x: x + size, y: y),
                (x: x + size, y: y + size),
                (x: x, y: y + size),
            ]]),
            station: Point::new(x, y),
            eligible: 100,
            cast: 50,
            turnout: 50.0,
        }
    }

    fn block(x: f64, y: f64, population: f64) -> DensityBlock {
        DensityBlock { centroid: Point::new(x, y), population }
    }

    #[test]
    fn geometric_centroid_of_unit_square() {
        let records = vec![record("01001", 0.0, 0.0, 1.0)];
        let centroids = geometric_centroids(&records).unwrap();
        assert!((centroids[0].x() - 0.5).abs() < 1e-12);
        assert!((centroids[0].y() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn two_block_weighted_centroid() {
        let records = vec![record("01001", 0.0, 0.0, 10.0)];
        let blocks = vec![block(2.0, 2.0, 300.0), block(8.0, 6.0, 100.0)];

        let (centroids, coverage) = weighted_centroids(&records, &blocks);
        let c = centroids[0].unwrap();
        // (300*2 + 100*8) / 400 = 3.5 ; (300*2 + 100*6) / 400 = 3.0
        assert!((c.x() - 3.5).abs() < 1e-12);
        assert!((c.y() - 3.0).abs() < 1e-12);
        assert_eq!(coverage.covered, 1);
        assert_eq!(coverage.orphan_blocks, 0);
    }

    #[test]
    fn three_block_weighted_centroid() {
        let records = vec![record("01001", 0.0, 0.0, 10.0)];
        let blocks = vec![
            block(1.0, 1.0, 100.0),
            block(5.0, 5.0, 200.0),
            block(9.0, 1.0, 700.0),
        ];

        let (centroids, _) = weighted_centroids(&records, &blocks);
        let c = centroids[0].unwrap();
        let expect_x = (100.0 * 1.0 + 200.0 * 5.0 + 700.0 * 9.0) / 1000.0;
        let expect_y = (100.0 * 1.0 + 200.0 * 5.0 + 700.0 * 1.0) / 1000.0;
        assert!((c.x() - expect_x).abs() < 1e-12);
        assert!((c.y() - expect_y).abs() < 1e-12);
    }

    #[test]
    fn uncovered_district_yields_none() {
        let records = vec![record("01001", 0.0, 0.0, 1.0), record("01002", 10.0, 10.0, 1.0)];
        let blocks = vec![block(0.5, 0.5, 50.0), block(100.0, 100.0, 9.0)];

        let (centroids, coverage) = weighted_centroids(&records, &blocks);
        assert!(centroids[0].is_some());
        assert!(centroids[1].is_none());
        assert_eq!(coverage.uncovered, 1);
        assert_eq!(coverage.orphan_blocks, 1);
    }

    #[test]
    fn disjoint_clusters_fold_to_one_centroid() {
        // One district, blocks at two far corners: still a single centroid.
        let records = vec![record("01001", 0.0, 0.0, 100.0)];
        let blocks = vec![block(10.0, 10.0, 500.0), block(90.0, 90.0, 500.0)];

        let (centroids, _) = weighted_centroids(&records, &blocks);
        let c = centroids[0].unwrap();
        assert!((c.x() - 50.0).abs() < 1e-12);
        assert!((c.y() - 50.0).abs() < 1e-12);
    }
}
