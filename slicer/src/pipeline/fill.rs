//! Stage E: solid (top/bottom) and sparse interior infill.

use geom_types::{close_paths, Pathset};
use tracing::debug;

use crate::geom2d::{self, infill::{self, InfillPattern}, JoinStyle};
use crate::progress::SlicePhase;
use crate::SlicerError;

use super::SliceJob;

impl<'a> SliceJob<'a> {
    pub(crate) fn run_fill(&mut self) -> Result<(), SlicerError> {
        let top_cnt = self.conf.get_int("top_layers").max(0) as usize;
        let bot_cnt = self.conf.get_int("bottom_layers").max(0) as usize;
        let overlap = self.conf.get_float("infill_overlap");
        let density = self.conf.get_float("infill_density") / 100.0;
        let infill_type = InfillPattern::from_config(self.conf.get_str("infill_type"));
        let ew = self.extrusion_width;
        let iw = self.infill_width;
        let layers = self.layers;

        let top_masks = &self.artifacts.top_masks;
        let bot_masks = &self.artifacts.bot_masks;
        let perims = &self.artifacts.perimeter_paths;

        let results: Vec<(Pathset, Pathset)> = self.par_layers(|layer| {
            if self.cancel.is_cancelled() {
                return (Vec::new(), Vec::new());
            }
            // Anything inside the innermost shell that is exposed within
            // the top/bottom window must print solid.
            let innermost = match perims[layer].last() {
                Some(shell) if !shell.is_empty() => shell,
                _ => return (Vec::new(), Vec::new()),
            };
            let mut outmask = Pathset::new();
            for mask in &top_masks[layer..(layer + top_cnt).min(layers)] {
                outmask = geom2d::union(&outmask, &close_paths(mask));
            }
            for mask in &bot_masks[(layer + 1).saturating_sub(bot_cnt)..=layer] {
                outmask = geom2d::union(&outmask, &close_paths(mask));
            }
            let solid_mask = geom2d::intersection(&outmask, innermost, true);
            let bounds = geom_types::paths_bounds(innermost);

            let base_ang = if layer % 2 == 0 { 45.0 } else { -45.0 };
            let solid_mask = geom2d::offset(&solid_mask, overlap - ew, JoinStyle::Square);
            let lines = infill::make_infill_lines(bounds, base_ang, 1.0, ew);
            let solid = geom2d::intersection(&lines, &solid_mask, false);

            // The remaining interior gets the sparse pattern. Density at
            // or past 0.99 degenerates to straight lines.
            let mut sparse = Pathset::new();
            if density > 0.0 {
                let pattern = if density >= 0.99 { InfillPattern::Lines } else { infill_type };
                let mask = geom2d::offset(innermost, overlap - iw, JoinStyle::Square);
                let mask = geom2d::difference(&mask, &solid_mask, true);
                let lines = match pattern {
                    InfillPattern::Lines => {
                        let ang = 90.0 * (layer % 2) as f64 + 45.0;
                        infill::make_infill_lines(bounds, ang, density, iw)
                    }
                    InfillPattern::Triangles => {
                        let ang = 60.0 * (layer % 3) as f64;
                        infill::make_infill_triangles(bounds, ang, density, iw)
                    }
                    InfillPattern::Grid => {
                        let ang = 90.0 * (layer % 2) as f64 + 45.0;
                        infill::make_infill_grid(bounds, ang, density, iw)
                    }
                    InfillPattern::Hexagons => {
                        let ang = 120.0 * (layer % 3) as f64;
                        infill::make_infill_hexagons(bounds, ang, density, iw)
                    }
                };
                sparse = geom2d::intersection(&lines, &mask, false);
            }
            self.report(SlicePhase::Fill, layer, layers);
            (solid, sparse)
        });
        self.check_cancelled()?;

        let (solid, sparse): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        self.artifacts.solid_infill = solid;
        self.artifacts.sparse_infill = sparse;
        debug!("fill complete for {} layers", layers);
        Ok(())
    }
}
