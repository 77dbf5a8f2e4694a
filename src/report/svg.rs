//! SVG drawing primitives for the map and histogram outputs.

use std::{fmt, io::Write};

use anyhow::{anyhow, Result};
use geo::{BoundingRect, Coord, CoordsIter, LineString, MultiPolygon, Point, Rect};

/// Projection function: map coords (meters) -> SVG coords (x,y).
pub(crate) type Projection = dyn Fn(&Coord<f64>) -> (f64, f64);

/// Simple RGB color.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Rgb {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
}

impl fmt::Display for Rgb {
    /// Format as CSS: rgb(r,g,b)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

/// Sequential ramp for a value in [0, 1]: pale yellow to deep red.
pub(crate) fn sequential_color(t: f64) -> Rgb {
    if !t.is_finite() {
        return Rgb { r: 150, g: 150, b: 150 };
    }
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    Rgb { r: lerp(255.0, 165.0), g: lerp(237.0, 15.0), b: lerp(160.0, 21.0) }
}

/// Bounding rect over a set of multipolygons.
pub(crate) fn bounds_of(polygons: &[MultiPolygon<f64>]) -> Result<Rect<f64>> {
    polygons.iter()
        .filter_map(|p| p.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        })
        .ok_or_else(|| anyhow!("cannot compute bounds of empty geometry"))
}

/// Fit `bounds` into a width×height viewport with a margin; y flipped
/// (SVG y grows downward, northing grows upward).
pub(crate) fn projection_for(
    bounds: Rect<f64>,
    width: f64,
    height: f64,
    margin: f64,
) -> impl Fn(&Coord<f64>) -> (f64, f64) {
    let scale = f64::min(
        (width - 2.0 * margin) / bounds.width().max(f64::EPSILON),
        (height - 2.0 * margin) / bounds.height().max(f64::EPSILON),
    );
    let min = bounds.min();
    let max = bounds.max();
    move |coord: &Coord<f64>| {
        let x = margin + (coord.x - min.x) * scale;
        let y = margin + (max.y - coord.y) * scale;
        (x, y)
    }
}

/// Write the SVG header, including the XML declaration and opening <svg> tag.
pub(crate) fn write_svg_header<W: Write>(writer: &mut W, width: f64, height: f64) -> Result<()> {
    writeln!(writer, r##"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"##)?;
    writeln!(
        writer,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"##
    )?;
    writeln!(writer, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##)?;
    Ok(())
}

/// Write SVG styles for map features.
pub(crate) fn write_svg_styles<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(writer, r##"<defs>
<style>
    .dst {{ fill: #e5e7eb; stroke: #111827; stroke-width: 0.5; fill-opacity: 0.85; }}
    .stn {{ fill: #1d4ed8; stroke: none; }}
    .ctr {{ fill: #b91c1c; stroke: none; }}
    .wct {{ fill: #047857; stroke: none; }}
    .edge {{ stroke: #2563eb; stroke-opacity: 0.35; stroke-width: 0.6; }}
    .bar {{ fill: #1d4ed8; fill-opacity: 0.8; }}
    .axis {{ stroke: #111827; stroke-width: 1; }}
    .lbl {{ font: 11px sans-serif; fill: #111827; }}
</style>
</defs>"##)?;
    Ok(())
}

/// Write the closing </svg> tag.
pub(crate) fn write_svg_footer<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(writer, "</svg>")?;
    Ok(())
}

pub(crate) fn draw_polygons(
    writer: &mut impl Write,
    polygons: &[MultiPolygon<f64>],
    project: &Projection,
) -> Result<()> {
    for polygon in polygons {
        writeln!(writer, r#"<path class="dst" d="{}"/>"#, multipolygon_to_path(polygon, project))?;
    }
    Ok(())
}

/// Draw polygons with specified fill colors.
pub(crate) fn draw_polygons_with_fill(
    writer: &mut impl Write,
    polygons: &[MultiPolygon<f64>],
    colors: &[String],
    project: &Projection,
) -> Result<()> {
    assert_eq!(
        colors.len(),
        polygons.len(),
        "[report::svg] length mismatch: {} colors for {} geometries",
        colors.len(),
        polygons.len(),
    );

    for (polygon, color) in polygons.iter().zip(colors.iter()) {
        writeln!(
            writer,
            r#"<path class="dst" d="{}" style="fill:{}"/>"#,
            multipolygon_to_path(polygon, project),
            color
        )?;
    }
    Ok(())
}

pub(crate) fn draw_points(
    writer: &mut impl Write,
    points: &[Point<f64>],
    class: &str,
    radius: f64,
    project: &Projection,
) -> Result<()> {
    for point in points {
        let (x, y) = project(&Coord { x: point.x(), y: point.y() });
        writeln!(writer, r#"<circle class="{class}" cx="{x:.3}" cy="{y:.3}" r="{radius}"/>"#)?;
    }
    Ok(())
}

pub(crate) fn draw_edges(
    writer: &mut impl Write,
    edges: &[(Point<f64>, Point<f64>)],
    project: &Projection,
) -> Result<()> {
    for edge in edges {
        let (x1, y1) = project(&Coord { x: edge.0.x(), y: edge.0.y() });
        let (x2, y2) = project(&Coord { x: edge.1.x(), y: edge.1.y() });
        writeln!(
            writer,
            r##"<line class="edge" x1="{x1:.3}" y1="{y1:.3}" x2="{x2:.3}" y2="{y2:.3}"/>"##
        )?;
    }
    Ok(())
}

pub(crate) fn draw_title(writer: &mut impl Write, title: &str, x: f64, y: f64) -> Result<()> {
    writeln!(writer, r#"<text class="lbl" x="{x}" y="{y}">{title}</text>"#)?;
    Ok(())
}

/// Build a compact SVG path string for a MultiPolygon (exteriors + holes).
fn multipolygon_to_path(shape: &MultiPolygon<f64>, project: &Projection) -> String {
    let mut out = String::new();

    for polygon in &shape.0 {
        out.push_str(&ring_to_path(polygon.exterior(), project));
        for interior in polygon.interiors() {
            out.push_str(&ring_to_path(interior, project));
        }
    }

    out
}

/// Build a compact SVG path string for a LineString (ring).
fn ring_to_path(ring: &LineString<f64>, project: &Projection) -> String {
    let mut out = String::new();

    let mut coords = ring.coords_iter().map(|coord| project(&coord));
    if let Some((x, y)) = coords.next() {
        out.push_str(&format!(" M{x:.3},{y:.3}"));
        for (x, y) in coords {
            out.push_str(&format!(" L{x:.3},{y:.3}"));
        }
        out.push('Z');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_fits_and_flips() {
        let bounds = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 100.0 });
        let project = projection_for(bounds, 220.0, 220.0, 10.0);

        let (x0, y0) = project(&Coord { x: 0.0, y: 0.0 });
        let (x1, y1) = project(&Coord { x: 100.0, y: 100.0 });
        assert_eq!((x0, y0), (10.0, 210.0)); // south-west lands bottom-left
        assert_eq!((x1, y1), (210.0, 10.0)); // north-east lands top-right
    }

    #[test]
    fn ramp_endpoints() {
        assert_eq!(sequential_color(0.0).to_string(), "rgb(255,237,160)");
        assert_eq!(sequential_color(1.0).to_string(), "rgb(165,15,21)");
        assert_eq!(sequential_color(f64::NAN).to_string(), "rgb(150,150,150)");
    }
}
