//! Canonical file names inside a data directory.
//!
//! The pipeline takes a directory, not individual file flags; these are the
//! fixed names `fetch` writes and `analyze` expects.

use std::path::{Path, PathBuf};

/// District boundary shapefile (Urnenwahlbezirke, EPSG:25833).
pub fn districts(data_dir: &Path) -> PathBuf {
    data_dir.join("wahlbezirke.shp")
}

/// Polling-station point shapefile.
pub fn stations(data_dir: &Path) -> PathBuf {
    data_dir.join("wahllokale.shp")
}

/// Election-results spreadsheet.
pub fn results(data_dir: &Path) -> PathBuf {
    data_dir.join("ergebnisse.xlsx")
}

/// Fetched population-density layer (GeoJSON from the WFS).
pub fn density_blocks(data_dir: &Path) -> PathBuf {
    data_dir.join("ewdichte.geojson")
}
