//! Stage D: first-layer adhesion aids (skirt, brim, raft).

use geom_types::{close_paths, Pathset};
use tracing::debug;

use crate::geom2d::{self, infill, JoinStyle};
use crate::SlicerError;

use super::SliceJob;

impl<'a> SliceJob<'a> {
    pub(crate) fn run_adhesion(&mut self) -> Result<(), SlicerError> {
        let adhesion = self.conf.get_str("adhesion_type");
        let skirt_w = self.conf.get_float("skirt_outset");
        let brim_w = self.conf.get_float("brim_width");
        let raft_w = self.conf.get_float("raft_outset");
        let overlap = self.conf.get_float("infill_overlap");
        let ew = self.extrusion_width;

        let empty = Pathset::new();
        let support0 = self.artifacts.support_outline.first().unwrap_or(&empty);
        let layer0 = self.artifacts.layer_paths.first().unwrap_or(&empty);

        // Skirt: a loose loop around everything printed on the first
        // layers, pushed out past any brim.
        let skirt_mask = geom2d::union(&self.skirt_bounds, support0);
        let skirt = geom2d::offset(&skirt_mask, brim_w + skirt_w + ew / 2.0, JoinStyle::Square);
        self.artifacts.skirt_paths = close_paths(&skirt);

        // Brim: concentric outward rings around the first layer outline.
        let mut brim = Pathset::new();
        if adhesion == "Brim" {
            let rings = (brim_w / ew).ceil() as usize;
            for i in 0..rings {
                let ring = geom2d::offset(layer0, (i as f64 + 0.5) * ew, JoinStyle::Square);
                brim.extend(ring);
            }
        }
        self.artifacts.brim_paths = close_paths(&brim);

        // Raft: a platform under the model and its support, dense lines on
        // top of a sparse base.
        let mut raft_outline = Pathset::new();
        let mut raft_infill: Vec<Pathset> = Vec::new();
        if adhesion == "Raft" {
            let outset = raft_w + (skirt_w + ew).max(raft_w + ew);
            let paths = geom2d::union(layer0, support0);
            raft_outline = geom2d::offset(&paths, outset, JoinStyle::Square);
            let bounds = geom_types::paths_bounds(&raft_outline);
            let mask = geom2d::offset(&raft_outline, overlap - ew, JoinStyle::Square);
            let lines = infill::make_infill_lines(bounds, 0.0, 0.75, ew);
            raft_infill.push(geom2d::intersection(&lines, &mask, false));
            for layer in 0..self.raft_layers.saturating_sub(1) {
                let base_ang = 90.0 * ((layer + 1) % 2) as f64;
                let lines = infill::make_infill_lines(bounds, base_ang, 1.0, ew);
                raft_infill.push(geom2d::intersection(&lines, &raft_outline, false));
            }
        }
        self.artifacts.raft_outline = close_paths(&raft_outline);
        self.artifacts.raft_infill = raft_infill;
        debug!(
            "adhesion: skirt {} paths, brim {} paths, raft {} layers",
            self.artifacts.skirt_paths.len(),
            self.artifacts.brim_paths.len(),
            self.artifacts.raft_infill.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::cube_slicer;
    use geom_types::paths_bounds;

    #[test]
    fn brim_emits_concentric_rings() {
        let mut slicer = cube_slicer(&[
            ("adhesion_type", "Brim"),
            ("brim_width", "2.0"),
            ("random_starts", "False"),
        ]);
        let artifacts = slicer.slice().unwrap();
        // ew = 0.5: ceil(2.0 / 0.5) = 4 rings.
        assert_eq!(artifacts.brim_paths.len(), 4);
        // Rings grow outward from the 10mm outline centered at (100, 100).
        let mut widths: Vec<f64> = artifacts
            .brim_paths
            .iter()
            .map(|ring| {
                let (minx, _, maxx, _) = paths_bounds(&vec![ring.clone()]);
                maxx - minx
            })
            .collect();
        widths.sort_by(f64::total_cmp);
        assert!((widths[0] - 10.5).abs() < 0.05);
        assert!((widths[3] - 13.5).abs() < 0.05);
        // Brim paths are closed.
        for ring in &artifacts.brim_paths {
            assert_eq!(ring.first(), ring.last());
        }
    }

    #[test]
    fn raft_platform_extends_past_model_and_adds_layers() {
        let mut slicer = cube_slicer(&[
            ("adhesion_type", "Raft"),
            ("raft_layers", "3"),
            ("raft_outset", "5.0"),
            ("random_starts", "False"),
        ]);
        let artifacts = slicer.slice().unwrap();
        assert_eq!(artifacts.raft_infill.len(), 3);
        assert!(!artifacts.raft_outline.is_empty());
        let (minx, _, maxx, _) = paths_bounds(&artifacts.raft_outline);
        // Model spans [95, 105]; raft outset 5 + (5 + 0.5) pushes well out.
        assert!(maxx - minx > 20.0);
        // Three raft layers prepend three Z levels: 50 print layers -> 53.
        assert_eq!(artifacts.routed.len(), 53);
        assert_eq!(artifacts.layer_zs.len(), 53);
        // The raft base is sparser than the upper raft layers.
        assert!(artifacts.raft_infill[0].len() < artifacts.raft_infill[1].len());
        // The raft outline is closed.
        for path in &artifacts.raft_outline {
            assert_eq!(path.first(), path.last());
        }
    }

    #[test]
    fn no_adhesion_by_default() {
        let mut slicer = cube_slicer(&[("random_starts", "False")]);
        let artifacts = slicer.slice().unwrap();
        assert!(artifacts.brim_paths.is_empty());
        assert!(artifacts.raft_outline.is_empty());
        assert!(artifacts.raft_infill.is_empty());
        // No skirt layers configured: no skirt either.
        assert!(artifacts.skirt_paths.is_empty());
    }
}
