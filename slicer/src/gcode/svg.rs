//! Layered SVG output of the routed toolpaths.
//!
//! One document sized to the bed, one `<g>` group per output layer, one
//! polyline per stitched path with its extrusion width as stroke width.
//! Y is flipped so the document reads like looking down at the bed.

use std::io::{self, Write};

use crate::config::SlicerConfig;
use crate::pipeline::SliceArtifacts;

const LAYER_COLORS: [&str; 4] = ["#0c0", "#aa0", "#00c", "#c00"];

/// Writes every routed layer as an SVG group.
pub fn write_svg<W: Write>(
    writer: &mut W,
    artifacts: &SliceArtifacts,
    conf: &SlicerConfig,
) -> io::Result<()> {
    let size_x = conf.get_float("bed_size_x");
    let size_y = conf.get_float("bed_size_y");
    let center_x = conf.get_float("bed_center_x");
    let center_y = conf.get_float("bed_center_y");
    let minx = center_x - size_x / 2.0;
    let maxy = center_y + size_y / 2.0;

    writeln!(writer, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        writer,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}mm" height="{}mm" viewBox="0 0 {} {}">"#,
        size_x, size_y, size_x, size_y
    )?;
    for (layer, nozzles) in artifacts.routed.iter().enumerate() {
        writeln!(
            writer,
            r#"  <g id="layer-{}" data-z="{:.3}" fill="none" stroke-linecap="round">"#,
            layer, artifacts.layer_zs[layer]
        )?;
        for (nozzle, groups) in nozzles.iter().enumerate() {
            for group in groups {
                for path in &group.paths {
                    if path.len() < 2 {
                        continue;
                    }
                    let points: Vec<String> = path
                        .iter()
                        .map(|p| format!("{:.3},{:.3}", p.x - minx, maxy - p.y))
                        .collect();
                    writeln!(
                        writer,
                        r#"    <polyline points="{}" stroke="{}" stroke-width="{:.3}"/>"#,
                        points.join(" "),
                        LAYER_COLORS[nozzle % LAYER_COLORS.len()],
                        group.width
                    )?;
                }
            }
        }
        writeln!(writer, "  </g>")?;
    }
    writeln!(writer, "</svg>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RoutedGroup;
    use geom_types::Point2;

    #[test]
    fn svg_contains_layer_groups_and_polylines() {
        let conf = SlicerConfig::new();
        let artifacts = SliceArtifacts {
            layer_zs: vec![0.2, 0.4],
            routed: vec![
                [
                    vec![RoutedGroup {
                        paths: vec![vec![Point2::new(95.0, 95.0), Point2::new(105.0, 95.0)]],
                        width: 0.5,
                    }],
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                ],
                Default::default(),
            ],
            ..Default::default()
        };
        let mut out = Vec::new();
        write_svg(&mut out, &artifacts, &conf).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#"<g id="layer-0""#));
        assert!(text.contains(r#"<g id="layer-1""#));
        // Bed is 200x200 centered at (100, 100): the point (95, 95) lands
        // at (95, 105) after the Y flip.
        assert!(text.contains("95.000,105.000"));
        assert!(text.contains(r#"stroke-width="0.500""#));
        assert!(text.ends_with("</svg>\n"));
    }
}
