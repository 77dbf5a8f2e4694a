use anyhow::{anyhow, Context, Result};
use geo::Coord;
use proj4rs::{proj::Proj as Proj4, transform::transform};

/// ETRS89 / UTM zone 33N, the metric CRS all Berlin administrative data uses.
/// Everything downstream (distances, contiguity, plots) assumes coordinates
/// in this CRS, in meters.
const UTM33_PROJ4: &str = "+proj=utm +zone=33 +ellps=GRS80 +units=m +no_defs +type=crs";

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

/// Coordinate transform from WGS84 lon/lat (degrees) to UTM 33N (meters).
///
/// Used for the density layer when the WFS answers in EPSG:4326; the local
/// vector files already ship in EPSG:25833.
pub struct Wgs84ToUtm33 {
    from: Proj4,
    to: Proj4,
}

impl Wgs84ToUtm33 {
    pub fn new() -> Result<Self> {
        let from = Proj4::from_proj_string(WGS84_PROJ4)
            .with_context(|| anyhow!("failed to build source PROJ.4: {WGS84_PROJ4}"))?;
        let to = Proj4::from_proj_string(UTM33_PROJ4)
            .with_context(|| anyhow!("failed to build target PROJ.4: {UTM33_PROJ4}"))?;
        Ok(Self { from, to })
    }

    /// Degrees in, meters out.
    pub fn apply(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| anyhow!("CRS transform failed at ({}, {}): {e}", coord.x, coord.y))?;
        Ok(Coord { x: point.0, y: point.1 })
    }
}

/// One-shot convenience wrapper around [`Wgs84ToUtm33`].
pub fn wgs84_to_utm33(coord: Coord<f64>) -> Result<Coord<f64>> {
    Wgs84ToUtm33::new()?.apply(coord)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn berlin_lands_in_utm33() {
        // Brandenburg Gate, roughly.
        let utm = wgs84_to_utm33(Coord { x: 13.3777, y: 52.5163 }).unwrap();
        // UTM 33N puts Berlin near easting 390km, northing 5820km.
        assert!((utm.x - 389_000.0).abs() < 5_000.0, "easting {}", utm.x);
        assert!((utm.y - 5_820_000.0).abs() < 5_000.0, "northing {}", utm.y);
    }
}
