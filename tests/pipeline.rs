// End-to-end tests over the public API: merge -> centroids -> distances ->
// contiguity weights -> model suite, on a synthetic grid of districts with
// a planted turnout/distance relationship.

use geo::{polygon, MultiPolygon, Point};
use rand::{rngs::StdRng, SeedableRng};

use wahlweg::ingest::{RawDistrict, RawResult, RawStation};
use wahlweg::key::StationKey;
use wahlweg::model::moran_test;
use wahlweg::{analyze_measure, centroid, distance, merge, SpatialWeights};

const ROWS: usize = 8;
const COLS: usize = 8;
const CELL: f64 = 1_000.0;

fn grid_key(row: usize, col: usize) -> StationKey {
    // Borough from the row, district number from the column.
    StationKey::from_parts(&format!("{:02}", row + 1), &format!("{:03}", col + 1)).unwrap()
}

fn cell_polygon(row: usize, col: usize) -> MultiPolygon<f64> {
    let x = col as f64 * CELL;
    let y = row as f64 * CELL;
    MultiPolygon(vec![polygon![
        (x: x, y: y),
        (x: x + CELL, y: y),
        (x: x + CELL, y: y + CELL),
        (x: x, y: y + CELL),
        (x: x, y: y),
    ]])
}

/// Deterministic pseudo-noise, bounded, mean roughly zero.
fn wiggle(i: usize) -> f64 {
    ((i as f64 * 12.9898).sin() * 43_758.545).fract() - 0.5
}

/// Build the three raw datasets for a ROWS x COLS grid. Station offset from
/// the cell centroid grows with the cell index; turnout falls with that
/// offset, so the planted distance coefficient is negative.
fn synthetic_inputs() -> (Vec<RawDistrict>, Vec<RawStation>, Vec<RawResult>) {
    let mut districts = Vec::new();
    let mut stations = Vec::new();
    let mut results = Vec::new();

    for row in 0..ROWS {
        for col in 0..COLS {
            let i = row * COLS + col;
            let key = grid_key(row, col);
            let center_x = (col as f64 + 0.5) * CELL;
            let center_y = (row as f64 + 0.5) * CELL;

            // Offset up to ~400m, varying smoothly across the grid.
            let offset = 400.0 * (i as f64 / (ROWS * COLS) as f64);
            districts.push(RawDistrict {
                key: Some(key.clone()),
                geometry: cell_polygon(row, col),
            });
            stations.push(RawStation {
                key: Some(key.clone()),
                location: Point::new(center_x + offset, center_y),
                postal_only: false,
            });

            let eligible = 1_000u64;
            let turnout = 0.80 - 0.0003 * offset + 0.01 * wiggle(i);
            results.push(RawResult {
                key: Some(key),
                eligible,
                cast: (eligible as f64 * turnout).round() as u64,
            });
        }
    }
    (districts, stations, results)
}

#[test]
fn merge_keeps_every_grid_district() {
    let (districts, stations, results) = synthetic_inputs();
    let (records, diag) = merge::merge(&districts, &stations, &results).unwrap();
    assert_eq!(records.len(), ROWS * COLS);
    assert_eq!(diag.matched, ROWS * COLS);
    assert_eq!(diag.unmatched_stations, 0);
    assert_eq!(diag.zero_eligible_dropped, 0);
}

#[test]
fn contiguity_on_grid_matches_rook_neighbors() {
    let (districts, stations, results) = synthetic_inputs();
    let (records, _) = merge::merge(&districts, &stations, &results).unwrap();
    let polygons: Vec<_> = records.iter().map(|r| r.polygon.clone()).collect();

    let weights = SpatialWeights::contiguity(&polygons).unwrap();
    let expected = SpatialWeights::from_neighbors(wahlweg::weights::grid_neighbors(ROWS, COLS));
    for i in 0..records.len() {
        let mut got = weights.neighbors_of(i).to_vec();
        let mut want = expected.neighbors_of(i).to_vec();
        got.sort_unstable();
        want.sort_unstable();
        assert_eq!(got, want, "neighbor set of cell {i}");
    }
}

#[test]
fn model_suite_recovers_negative_distance_effect() {
    let (districts, stations, results) = synthetic_inputs();
    let (records, _) = merge::merge(&districts, &stations, &results).unwrap();

    let centroids = centroid::geometric_centroids(&records).unwrap();
    let distances = distance::station_distances(&records, &centroids);
    let turnout: Vec<f64> = records.iter().map(|r| r.turnout).collect();
    let polygons: Vec<_> = records.iter().map(|r| r.polygon.clone()).collect();
    let weights = SpatialWeights::contiguity(&polygons).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let analysis =
        analyze_measure("distance to geometric centroid", &turnout, &distances, &weights, 100, &mut rng)
            .unwrap();

    let slope = &analysis.ols.coefficients[1];
    assert!(slope.estimate < 0.0, "planted effect is negative, got {}", slope.estimate);
    assert!(slope.p_value < 0.05, "planted effect should be detectable, p = {}", slope.p_value);

    // The SAR fit must agree on the sign of the distance effect, and its
    // total impact must decompose consistently.
    let sar_slope = &analysis.sar.coefficients[1];
    assert!(sar_slope.estimate < 0.0);
    for impact in &analysis.sar.impacts {
        assert!(
            (impact.direct + impact.indirect - impact.total).abs() < 1e-9,
            "impact decomposition must be additive for {}",
            impact.name
        );
    }

    // AIC selection picked one of the three fitted models.
    assert!(["OLS", "SLX", "SAR"].iter().any(|m| analysis.preferred.contains(m)));
}

#[test]
fn moran_rejects_gradient_but_not_noise() {
    let weights = SpatialWeights::from_neighbors(wahlweg::weights::grid_neighbors(ROWS, COLS));

    let gradient: Vec<f64> = (0..ROWS * COLS).map(|i| (i / COLS) as f64).collect();
    let clustered = moran_test(&gradient, &weights).unwrap();
    assert!(clustered.statistic > 0.3);
    assert!(clustered.p_value < 0.05);

    let noise: Vec<f64> = (0..ROWS * COLS).map(wiggle).collect();
    let scattered = moran_test(&noise, &weights).unwrap();
    assert!(
        scattered.statistic.abs() < 0.3,
        "white noise must not look clustered, I = {}",
        scattered.statistic
    );
    assert!(scattered.p_value > 0.01, "p = {}", scattered.p_value);
}
