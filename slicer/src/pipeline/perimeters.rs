//! Stage A/B: layer outlines, perimeter shells, top/bottom masks.

use geom_types::{close_paths, Path, Pathset};
use tracing::debug;

use crate::geom2d::{self, JoinStyle};
use crate::progress::SlicePhase;
use crate::SlicerError;

use super::SliceJob;

/// Cyclically rotates a closed path so printing starts `randpos` of the
/// way around it.
fn rotate_start(path: &Path, randpos: f64) -> Path {
    if path.len() < 3 {
        return path.clone();
    }
    let i = (randpos * (path.len() - 1) as f64) as usize;
    if i == 0 {
        return path.clone();
    }
    let mut out = Path::with_capacity(path.len());
    out.extend_from_slice(&path[i..]);
    out.extend_from_slice(&path[1..=i]);
    out
}

struct LayerPerims {
    outline: Pathset,
    dead: Pathset,
    shells: Vec<Pathset>,
}

impl<'a> SliceJob<'a> {
    /// Slices every layer at its mid-height, derives the shells, and
    /// computes the top/bottom exposure masks from neighboring layers.
    pub(crate) fn run_perimeters(&mut self) -> Result<(), SlicerError> {
        let shell_count = self.conf.get_int("shell_count").max(1) as usize;
        let random_starts = self.conf.get_bool("random_starts");
        let skirt_layers = self.conf.get_int("skirt_layers").max(0) as usize;
        let ew = self.extrusion_width;

        let sliced: Vec<LayerPerims> = self.par_layers(|layer| {
            if self.cancel.is_cancelled() {
                return LayerPerims {
                    outline: Vec::new(),
                    dead: Vec::new(),
                    shells: vec![Vec::new(); shell_count],
                };
            }
            let z = self.print_z(layer) - self.layer_h / 2.0;
            let mut outline: Pathset = Vec::new();
            let mut dead: Pathset = Vec::new();
            for model in self.models {
                let (model_paths, dead_paths) = model.slice_at_z(z, self.layer_h);
                dead.extend(dead_paths);
                let model_paths = geom2d::orient_paths(&model_paths);
                outline = geom2d::union(&outline, &model_paths);
            }

            let randpos: f64 = rand::random();
            let mut shells: Vec<Pathset> = Vec::with_capacity(shell_count);
            for i in 0..shell_count {
                let inset = -(i as f64 + 0.5) * ew;
                let mut shell = close_paths(&geom2d::offset(&outline, inset, JoinStyle::Square));
                if random_starts {
                    // One rotation per layer, shared by every shell.
                    shell = shell.iter().map(|path| rotate_start(path, randpos)).collect();
                }
                shells.push(shell);
            }
            self.report(SlicePhase::Perimeters, layer, self.layers * 2);
            LayerPerims { outline, dead, shells }
        });
        self.check_cancelled()?;

        for (layer, result) in sliced.iter().enumerate() {
            if layer < skirt_layers {
                self.skirt_bounds = geom2d::union(&self.skirt_bounds, &result.outline);
            }
            if !result.dead.is_empty() {
                self.artifacts.degenerate_layers.push(layer as u32);
            }
        }
        self.artifacts.layer_paths = sliced.iter().map(|r| r.outline.clone()).collect();
        self.artifacts.dead_paths = sliced.iter().map(|r| r.dead.clone()).collect();
        self.artifacts.perimeter_paths = sliced.into_iter().map(|r| r.shells).collect();

        // Top/bottom masks: what this layer's outermost shell covers that
        // its neighbor above/below does not.
        let perims = &self.artifacts.perimeter_paths;
        let layers = self.layers;
        let empty: Pathset = Vec::new();
        let masks: Vec<(Pathset, Pathset)> = self.par_layers(|layer| {
            let perim = &perims[layer][0];
            let above = if layer + 1 < layers { &perims[layer + 1][0] } else { &empty };
            let below = if layer >= 1 { &perims[layer - 1][0] } else { &empty };
            self.report(SlicePhase::Perimeters, layers + layer, layers * 2);
            (
                geom2d::difference(perim, above, true),
                geom2d::difference(perim, below, true),
            )
        });
        self.check_cancelled()?;
        let (top, bot): (Vec<_>, Vec<_>) = masks.into_iter().unzip();
        self.artifacts.top_masks = top;
        self.artifacts.bot_masks = bot;
        debug!("perimeters complete for {} layers", layers);
        Ok(())
    }
}
