//! Key-based fusion of districts, stations, and results.
//!
//! The district layer is the spine: stations (postal-only rows excluded)
//! and result rows are joined onto it by [`StationKey`]. Every way a row
//! can fall out of the join is counted in [`MergeDiagnostics`] instead of
//! disappearing silently. The output records are immutable; each later
//! step takes the geometry it needs as an explicit parameter.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use geo::{MultiPolygon, Point};
use log::{info, warn};

use crate::ingest::{RawDistrict, RawResult, RawStation};
use crate::key::StationKey;

/// One fully merged voting district: polygon, station point, counts,
/// derived turnout. Only rows that survived every join predicate appear.
#[derive(Debug, Clone)]
pub struct DistrictRecord {
    pub key: StationKey,
    pub polygon: MultiPolygon<f64>,
    pub station: Point<f64>,
    pub eligible: u64,
    pub cast: u64,
    /// Percent of registered voters who cast a ballot, in [0, 100].
    pub turnout: f64,
}

/// Everything the merge dropped, by reason.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeDiagnostics {
    pub matched: usize,
    /// Districts with no valid key in the source row.
    pub keyless_districts: usize,
    /// Districts whose key has no (non-postal) station.
    pub unmatched_stations: usize,
    /// Districts whose key has no results row.
    pub unmatched_results: usize,
    /// Station rows excluded by the postal-only predicate.
    pub postal_only_excluded: usize,
    /// Rows dropped by the zero-registered-voters predicate.
    pub zero_eligible_dropped: usize,
    /// Results rows reporting more ballots than registered voters.
    pub cast_exceeds_eligible: usize,
    /// Keys appearing more than once in stations or results.
    pub duplicate_keys: usize,
}

impl MergeDiagnostics {
    /// Log every non-zero counter; warn on the ones that mean data loss.
    pub fn log(&self) {
        info!("merge: {} districts fully matched", self.matched);
        if self.postal_only_excluded > 0 {
            info!("merge: {} postal-only station rows excluded", self.postal_only_excluded);
        }
        if self.keyless_districts > 0 {
            warn!("merge: {} district rows without a valid key", self.keyless_districts);
        }
        if self.unmatched_stations > 0 {
            warn!("merge: {} districts have no matching station", self.unmatched_stations);
        }
        if self.unmatched_results > 0 {
            warn!("merge: {} districts have no matching results row", self.unmatched_results);
        }
        if self.zero_eligible_dropped > 0 {
            warn!(
                "merge: {} districts dropped (zero registered voters, turnout undefined)",
                self.zero_eligible_dropped
            );
        }
        if self.cast_exceeds_eligible > 0 {
            warn!(
                "merge: {} districts dropped (more ballots than registered voters)",
                self.cast_exceeds_eligible
            );
        }
        if self.duplicate_keys > 0 {
            warn!("merge: {} duplicate keys across stations/results", self.duplicate_keys);
        }
    }
}

/// Join the three sources on the normalized key.
///
/// District order is preserved; a district missing its station or results
/// is excluded from the output (it could not take part in any
/// geometry-dependent or turnout-dependent step anyway) and counted.
pub fn merge(
    districts: &[RawDistrict],
    stations: &[RawStation],
    results: &[RawResult],
) -> Result<(Vec<DistrictRecord>, MergeDiagnostics)> {
    let mut diag = MergeDiagnostics::default();

    let mut station_by_key: HashMap<StationKey, Point<f64>> = HashMap::new();
    for station in stations {
        if station.postal_only {
            diag.postal_only_excluded += 1;
            continue;
        }
        let Some(key) = &station.key else { continue };
        if station_by_key.insert(key.clone(), station.location).is_some() {
            diag.duplicate_keys += 1;
        }
    }

    let mut result_by_key: HashMap<StationKey, &RawResult> = HashMap::new();
    for result in results {
        let Some(key) = &result.key else { continue };
        if result_by_key.insert(key.clone(), result).is_some() {
            diag.duplicate_keys += 1;
        }
    }

    let mut seen_district_keys: HashSet<StationKey> = HashSet::new();
    let mut records = Vec::with_capacity(districts.len());

    for district in districts {
        let Some(key) = &district.key else {
            diag.keyless_districts += 1;
            continue;
        };
        if !seen_district_keys.insert(key.clone()) {
            diag.duplicate_keys += 1;
        }

        let Some(&station) = station_by_key.get(key) else {
            diag.unmatched_stations += 1;
            continue;
        };
        let Some(result) = result_by_key.get(key) else {
            diag.unmatched_results += 1;
            continue;
        };

        // Named predicate replacing the source's positional row exclusion:
        // turnout is undefined when nobody is registered.
        if result.eligible == 0 {
            diag.zero_eligible_dropped += 1;
            continue;
        }
        // More ballots than voters would push turnout past 100%.
        if result.cast > result.eligible {
            diag.cast_exceeds_eligible += 1;
            continue;
        }

        records.push(DistrictRecord {
            key: key.clone(),
            polygon: district.geometry.clone(),
            station,
            eligible: result.eligible,
            cast: result.cast,
            turnout: 100.0 * result.cast as f64 / result.eligible as f64,
        });
    }

    diag.matched = records.len();
    if records.is_empty() {
        bail!("merge produced no matched districts; check the key columns of the inputs");
    }

    Ok((records, diag))
}
