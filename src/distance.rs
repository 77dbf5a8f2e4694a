//! Station-to-centroid distances, the explanatory variables of the study.
//!
//! Element-wise by record order (never an all-pairs matrix). All inputs are
//! in EPSG:25833, so planar Euclidean distance is meters.

use geo::{Distance, Euclidean, Point};

use crate::merge::DistrictRecord;

/// Distance from each station to its district's reference point.
pub fn station_distances(records: &[DistrictRecord], reference: &[Point<f64>]) -> Vec<f64> {
    debug_assert_eq!(records.len(), reference.len());
    records.iter()
        .zip(reference)
        .map(|(record, point)| Euclidean.distance(record.station, *point))
        .collect()
}

/// Same, against an optional reference point (the weighted centroid): a
/// district without one propagates `None` and is dropped before regression.
pub fn station_distances_opt(
    records: &[DistrictRecord],
    reference: &[Option<Point<f64>>],
) -> Vec<Option<f64>> {
    debug_assert_eq!(records.len(), reference.len());
    records.iter()
        .zip(reference)
        .map(|(record, point)| point.map(|p| Euclidean.distance(record.station, p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use geo::{polygon, MultiPolygon};

    use super::*;
    use crate::key::StationKey;

    fn record(station: Point<f64>) -> DistrictRecord {
        DistrictRecord {
            key: StationKey::from_combined("01001").unwrap(),
            polygon: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0),
            ]]),
            station,
            eligible: 10,
            cast: 5,
            turnout: 50.0,
        }
    }

    #[test]
    fn distances_are_non_negative_and_exact() {
        let records = vec![record(Point::new(0.0, 0.0)), record(Point::new(3.0, 4.0))];
        let reference = vec![Point::new(0.0, 0.0), Point::new(0.0, 0.0)];

        let distances = station_distances(&records, &reference);
        assert_eq!(distances[0], 0.0); // zero iff coincident
        assert_eq!(distances[1], 5.0);
        assert!(distances.iter().all(|d| *d >= 0.0));
    }

    #[test]
    fn missing_reference_propagates_none() {
        let records = vec![record(Point::new(0.0, 0.0)), record(Point::new(1.0, 1.0))];
        let reference = vec![Some(Point::new(1.0, 0.0)), None];

        let distances = station_distances_opt(&records, &reference);
        assert_eq!(distances[0], Some(1.0));
        assert_eq!(distances[1], None);
    }
}
