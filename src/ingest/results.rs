//! Election-results spreadsheet reader.
//!
//! The AfS Berlin export is an xlsx with one row per Wahlbezirk; the key is
//! split over a borough and a sub-district column, both delivered as numbers
//! (leading zeros gone). Column headers are matched by name on the first row.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use log::debug;

use crate::key::StationKey;

use super::RawResult;

const BOROUGH_COLUMN: &str = "Bezirksnummer";
const UNIT_COLUMN: &str = "Wahlbezirk";
const ELIGIBLE_COLUMN: &str = "Wahlberechtigte insgesamt";
const CAST_COLUMN: &str = "Wählende insgesamt";

/// Read the results table from the first worksheet.
pub fn read_results(path: &Path) -> Result<Vec<RawResult>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open results spreadsheet: {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("results dataset: {} has no worksheets", path.display()))?
        .with_context(|| format!("results dataset: failed to read {}", path.display()))?;

    let mut rows = range.rows();
    let header = rows.next()
        .ok_or_else(|| anyhow!("results dataset: {} is empty", path.display()))?;

    let col = |name: &str| -> Result<usize> {
        header.iter()
            .position(|cell| cell.as_string().map(|s| s.trim() == name).unwrap_or(false))
            .ok_or_else(|| anyhow!(
                "results dataset: column '{name}' not found in {}", path.display()
            ))
    };
    let borough_col = col(BOROUGH_COLUMN)?;
    let unit_col = col(UNIT_COLUMN)?;
    let eligible_col = col(ELIGIBLE_COLUMN)?;
    let cast_col = col(CAST_COLUMN)?;

    let mut results = Vec::new();
    for (i, row) in rows.enumerate() {
        // Trailing empty rows are common in these exports.
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }

        let key = match (cell_f64(row, borough_col), cell_f64(row, unit_col)) {
            (Some(b), Some(u)) => StationKey::from_numeric(b, u),
            _ => cell_string(row, borough_col)
                .zip(cell_string(row, unit_col))
                .and_then(|(b, u)| StationKey::from_parts(&b, &u)),
        };

        let eligible = cell_count(row, eligible_col)
            .with_context(|| row_context(path, i, ELIGIBLE_COLUMN, &key))?;
        let cast = cell_count(row, cast_col)
            .with_context(|| row_context(path, i, CAST_COLUMN, &key))?;

        results.push(RawResult { key, eligible, cast });
    }

    debug!("results: {} rows from {}", results.len(), path.display());
    Ok(results)
}

fn row_context(path: &Path, row: usize, column: &str, key: &Option<StationKey>) -> String {
    let key = key.as_ref().map(|k| k.as_str().to_owned()).unwrap_or_else(|| "?".into());
    format!(
        "results dataset: bad '{column}' in {} (data row {row}, key {key})",
        path.display()
    )
}

fn cell_f64(row: &[Data], idx: usize) -> Option<f64> {
    row.get(idx).and_then(|cell| cell.as_f64())
}

fn cell_string(row: &[Data], idx: usize) -> Option<String> {
    row.get(idx).and_then(|cell| cell.as_string())
}

fn cell_count(row: &[Data], idx: usize) -> Result<u64> {
    let value = cell_f64(row, idx).ok_or_else(|| anyhow!("cell is not numeric"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("count is negative or not finite: {value}");
    }
    Ok(value as u64)
}
