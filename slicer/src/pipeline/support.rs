//! Stage C: support drop masks, outlines, and support infill.
//!
//! Overhang footprints are accumulated from the top layer downward: a
//! steep downward face adds its footprint to the drop mask, an upward (or
//! printable) face subtracts it. What survives after clearing the region
//! near the model is the area that must be held up at that layer.

use geom_types::{close_paths, Path, Pathset, Point3, Vector3};
use tracing::debug;

use crate::geom2d::{self, infill, JoinStyle};
use crate::progress::SlicePhase;
use crate::SlicerError;

use super::SliceJob;

struct Overhang {
    adds: Pathset,
    diffs: Pathset,
}

impl<'a> SliceJob<'a> {
    pub(crate) fn run_support(&mut self) -> Result<(), SlicerError> {
        self.artifacts.support_outline = vec![Vec::new(); self.layers];
        self.artifacts.support_infill = vec![Vec::new(); self.layers];
        let supp_type = self.conf.get_str("support_type");
        if supp_type == "None" {
            return Ok(());
        }
        let supp_ang = self.conf.get_int("overhang_angle") as f64;
        let outset = self.conf.get_float("support_outset");
        let overlap = self.conf.get_float("infill_overlap");
        let density = self.conf.get_float("support_density") / 100.0;
        let ew = self.extrusion_width;
        let layer_h = self.layer_h;

        // Collect every facet once. A facet contributes to the drop mask
        // only across the band of layers its Z extent touches: the part of
        // it above a layer's slice plane is what needs holding up (or what
        // catches falling support, for printable faces). Below the band
        // the accumulated mask carries the contribution instead.
        let facets: Vec<([Point3; 3], Vector3)> = self
            .models
            .iter()
            .flat_map(|model| {
                model.triangles.iter().map(move |(idx, tri)| {
                    (model.triangles.coords(&model.points, idx), tri.norm)
                })
            })
            .collect();
        let mut layer_facets: Vec<Vec<usize>> = vec![Vec::new(); self.layers];
        for (fnum, (verts, _)) in facets.iter().enumerate() {
            let (minz, maxz) = geom_types::triangle::z_range(verts);
            let minl = (minz / layer_h).floor() as i64 - 1;
            let maxl = (maxz / layer_h).ceil() as i64 - 1;
            for layer in minl..=maxl {
                if layer >= 0 && (layer as usize) < self.layers {
                    layer_facets[layer as usize].push(fnum);
                }
            }
        }

        // Per-layer overhang contributions, computed in parallel; the
        // top-down accumulation below is inherently sequential.
        let overhangs: Vec<Overhang> = self.par_layers(|layer| {
            let z = self.print_z(layer) - layer_h / 2.0;
            let mut adds = Pathset::new();
            let mut diffs = Pathset::new();
            for &fnum in &layer_facets[layer] {
                let (verts, norm) = &facets[fnum];
                let Some(footprint) = geom_types::triangle::footprint(verts, Some(z)) else {
                    continue;
                };
                if geom_types::triangle::overhang_angle(norm) < supp_ang {
                    diffs.push(footprint);
                } else {
                    adds.push(footprint);
                }
            }
            Overhang { adds, diffs }
        });
        self.check_cancelled()?;

        let mut drop_mask: Pathset = Vec::new();
        let mut drop_paths: Vec<Pathset> = vec![Vec::new(); self.layers];
        for layer in (0..self.layers).rev() {
            drop_mask = geom2d::union(&drop_mask, &overhangs[layer].adds);
            drop_mask = geom2d::difference(&drop_mask, &overhangs[layer].diffs, true);
            drop_paths[layer] = drop_mask.clone();
            self.report(SlicePhase::Support, self.layers - layer, self.layers * 3);
        }

        // Clear the region too close to the model; External support also
        // clears everything above previously-cleared regions.
        let layer_paths = &self.artifacts.layer_paths;
        let mut masks: Vec<Pathset> = self.par_layers(|layer| {
            let mut mask = geom2d::offset(&layer_paths[layer], outset, JoinStyle::Square);
            if layer > 0 && supp_type == "Everywhere" {
                mask = geom2d::union(&mask, &layer_paths[layer - 1]);
            }
            if layer + 1 < self.layers {
                mask = geom2d::union(&mask, &layer_paths[layer + 1]);
            }
            mask
        });
        self.check_cancelled()?;
        if supp_type == "External" {
            let mut cumulative: Pathset = Vec::new();
            for mask in &mut masks {
                cumulative = geom2d::union(&cumulative, mask);
                *mask = cumulative.clone();
            }
        }

        let cleaned: Vec<Pathset> = self.par_layers(|layer| {
            let mut overhang = geom2d::difference(&drop_paths[layer], &masks[layer], true);
            // Morphological open/close pass to drop slivers thinner than
            // one extrusion.
            overhang = geom2d::offset(&overhang, ew, JoinStyle::Square);
            overhang = geom2d::offset(&overhang, -ew * 2.0, JoinStyle::Square);
            overhang = geom2d::offset(&overhang, ew, JoinStyle::Square);
            self.report(SlicePhase::Support, self.layers + layer, self.layers * 3);
            close_paths(&overhang)
        });
        self.check_cancelled()?;

        let results: Vec<(Pathset, Vec<Path>)> = self.par_layers(|layer| {
            let overhang = &cleaned[layer];
            if density <= 0.0 || overhang.is_empty() {
                return (Vec::new(), Vec::new());
            }
            let outline = close_paths(&geom2d::offset(overhang, -ew / 2.0, JoinStyle::Square));
            let mask = geom2d::offset(&outline, overlap - ew, JoinStyle::Square);
            let bounds = geom_types::paths_bounds(&mask);
            let lines = infill::make_infill_lines(bounds, 0.0, density, ew);
            let fill = geom2d::intersection(&lines, &mask, false);
            self.report(SlicePhase::Support, self.layers * 2 + layer, self.layers * 3);
            (outline, fill)
        });
        self.check_cancelled()?;
        for (layer, (outline, fill)) in results.into_iter().enumerate() {
            self.artifacts.support_outline[layer] = outline;
            self.artifacts.support_infill[layer] = fill;
        }
        debug!(
            "support outlines on {} layers",
            self.artifacts
                .support_outline
                .iter()
                .filter(|o| !o.is_empty())
                .count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Slicer;
    use crate::config::SlicerConfig;
    use crate::core::mesh::test_meshes;
    use geom_types::paths_bounds;

    /// A 20mm cube with a 2mm-thick shelf sticking out 6mm at z=5: the
    /// shelf's underside is a pure horizontal overhang.
    fn shelf_slicer(supp_type: &str) -> Slicer {
        let mut mesh = test_meshes::boxed([0.0, 0.0, 0.0], [20.0, 20.0, 20.0]);
        test_meshes::add_box(&mut mesh, [20.0, 7.0, 5.0], [26.0, 13.0, 7.0]);
        let mut conf = SlicerConfig::new();
        conf.set("support_type", supp_type).unwrap();
        conf.set("support_outset", "0.5").unwrap();
        conf.set("overhang_angle", "45").unwrap();
        conf.set("random_starts", "False").unwrap();
        Slicer::new(vec![mesh], conf)
    }

    #[test]
    fn no_support_for_support_type_none() {
        let mut slicer = shelf_slicer("None");
        let artifacts = slicer.slice().unwrap();
        assert!(artifacts.support_outline.iter().all(|o| o.is_empty()));
        assert!(artifacts.support_infill.iter().all(|o| o.is_empty()));
    }

    #[test]
    fn shelf_gets_external_support_below_it() {
        let mut slicer = shelf_slicer("External");
        let artifacts = slicer.slice().unwrap();
        let layer_h = 0.2;
        let shelf_bottom_layer = (5.0 / layer_h) as usize;
        // Support must run from the bed up to just under the shelf.
        let supported: Vec<usize> = (0..artifacts.support_outline.len())
            .filter(|&l| !artifacts.support_outline[l].is_empty())
            .collect();
        assert!(!supported.is_empty(), "no support generated");
        assert_eq!(*supported.first().unwrap(), 0);
        let top = *supported.last().unwrap();
        assert!(
            top >= shelf_bottom_layer - 2 && top <= shelf_bottom_layer,
            "support tops out at layer {}",
            top
        );
        // And nothing at or above the shelf body.
        for layer in (7.0 / layer_h) as usize..artifacts.support_outline.len() {
            assert!(artifacts.support_outline[layer].is_empty(), "layer {}", layer);
        }

        // After bed centering the combined model spans x in [87, 113]: the
        // cube body ends at x=107 and the shelf hangs over [107, 113] with
        // y in [97, 103]. Support must hug the shelf footprint, cleared
        // 0.5mm away from the cube wall.
        let layer = shelf_bottom_layer / 2;
        let (minx, miny, maxx, maxy) = paths_bounds(&artifacts.support_outline[layer]);
        assert!(minx > 107.0, "support overlaps the cube: minx={}", minx);
        assert!(minx < 108.5);
        assert!(maxx <= 113.0);
        assert!(miny > 96.0 && maxy < 104.0);
        // Support infill exists there too.
        assert!(!artifacts.support_infill[layer].is_empty());
    }

    #[test]
    fn cube_alone_needs_no_support() {
        let cube = test_meshes::boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        let mut conf = SlicerConfig::new();
        conf.set("support_type", "External").unwrap();
        conf.set("random_starts", "False").unwrap();
        let mut slicer = Slicer::new(vec![cube], conf);
        let artifacts = slicer.slice().unwrap();
        assert!(artifacts.support_outline.iter().all(|o| o.is_empty()));
    }
}
