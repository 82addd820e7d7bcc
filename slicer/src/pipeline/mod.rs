//! # Slicer Pipeline
//!
//! The orchestrator that turns centered, layer-indexed meshes into routed
//! per-layer toolpath groups:
//!
//! - **perimeters** (stage A/B): layer outlines, shells, top/bottom masks
//! - **support** (stage C): overhang drop masks, support outlines + infill
//! - **adhesion** (stage D): skirt, brim, raft
//! - **fill** (stage E): solid and sparse infill
//! - **routing** (stage F): priority-ordered path groups, greedily stitched
//!
//! Stages are fenced: each runs to completion across all layers before the
//! next starts, and the per-layer work inside a stage runs on the rayon
//! pool (each task writes only its own layer slot). The accumulating scans
//! (support drop masks, the External cumulative mask, skirt bounds) stay
//! sequential.
//!
//! Layer numbering: `layers` print layers are sliced from the mesh, and
//! `raft_layers` extra output layers are prepended below them when a raft
//! is enabled, so print layer `n` is emitted as output layer
//! `n + raft_layers`.

mod adhesion;
mod fill;
mod perimeters;
mod routing;
mod support;

use geom_types::{Path, Pathset};
use rayon::prelude::*;
use tracing::info;

use crate::config::SlicerConfig;
use crate::core::Mesh;
use crate::progress::{CancelToken, ProgressCallback, SlicePhase, SliceProgress};
use crate::SlicerError;

/// The extrusion-width to nozzle-diameter ratio.
pub const EXTRUSION_RATIO: f64 = 1.25;

/// Greedy path stitching threshold, in millimeters.
pub const JOIN_THRESHOLD: f64 = 2.0;

/// One routed group: stitched paths sharing an extrusion width.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedGroup {
    pub paths: Vec<Path>,
    pub width: f64,
}

/// Per-layer, per-nozzle routed output. Indexed `[layer][nozzle]`.
pub type RoutedLayers = Vec<[Vec<RoutedGroup>; 4]>;

/// Everything the pipeline produces, layer by layer. Viewers consume this
/// read-only; the G-code emitter consumes `routed` and `layer_zs`.
#[derive(Debug, Default, Clone)]
pub struct SliceArtifacts {
    /// Union outline of each print layer.
    pub layer_paths: Vec<Pathset>,
    /// Unclosed slice chains per print layer (degenerate geometry).
    pub dead_paths: Vec<Pathset>,
    /// Shells per print layer, outermost first.
    pub perimeter_paths: Vec<Vec<Pathset>>,
    /// Region of each layer with nothing above it.
    pub top_masks: Vec<Pathset>,
    /// Region of each layer with nothing below it.
    pub bot_masks: Vec<Pathset>,
    /// Support outlines and support infill per print layer.
    pub support_outline: Vec<Pathset>,
    pub support_infill: Vec<Pathset>,
    /// Adhesion geometry.
    pub skirt_paths: Pathset,
    pub brim_paths: Pathset,
    pub raft_outline: Pathset,
    pub raft_infill: Vec<Pathset>,
    /// Solid and sparse infill per print layer.
    pub solid_infill: Vec<Pathset>,
    pub sparse_infill: Vec<Pathset>,
    /// Final routed output, indexed by output layer (prints + raft).
    pub routed: RoutedLayers,
    /// Z height of each output layer.
    pub layer_zs: Vec<f64>,
    /// Print layers whose slice produced dead paths.
    pub degenerate_layers: Vec<u32>,
}

/// Derived slicing parameters plus the artifact store; one per run.
pub struct SliceJob<'a> {
    pub(crate) models: &'a [Mesh],
    pub(crate) conf: &'a SlicerConfig,
    pub(crate) progress: Option<&'a ProgressCallback>,
    pub(crate) cancel: &'a CancelToken,

    pub(crate) layer_h: f64,
    pub(crate) layers: usize,
    pub(crate) raft_layers: usize,
    pub(crate) extrusion_width: f64,
    pub(crate) infill_width: f64,
    pub(crate) support_width: f64,
    pub(crate) dflt_nozl: usize,
    pub(crate) infl_nozl: usize,
    pub(crate) supp_nozl: usize,

    pub(crate) skirt_bounds: Pathset,
    pub artifacts: SliceArtifacts,
}

impl<'a> SliceJob<'a> {
    pub(crate) fn new(
        models: &'a [Mesh],
        conf: &'a SlicerConfig,
        progress: Option<&'a ProgressCallback>,
        cancel: &'a CancelToken,
    ) -> Self {
        let layer_h = conf.get_float("layer_height");
        let raft_layers = if conf.get_str("adhesion_type") == "Raft" {
            conf.get_int("raft_layers") as usize
        } else {
            0
        };
        let dflt_nozl = conf.get_int("default_nozzle").max(0) as usize;
        let infl_nozl = match conf.get_int("infill_nozzle") {
            -1 => dflt_nozl,
            n => n.max(0) as usize,
        };
        let supp_nozl = match conf.get_int("support_nozzle") {
            -1 => dflt_nozl,
            n => n.max(0) as usize,
        };
        let nozzle_diam =
            |n: usize| conf.get_float(&format!("nozzle_{}_diam", n)) * EXTRUSION_RATIO;

        let height = models
            .iter()
            .map(|m| {
                let bb = m.points.bounds();
                bb.maxz - bb.minz
            })
            .fold(0.0, f64::max);
        let layers = (height / layer_h) as usize;
        let layer_zs: Vec<f64> = (0..layers + raft_layers)
            .map(|layer| layer_h * (layer as f64 + 1.0))
            .collect();

        let mut artifacts = SliceArtifacts {
            layer_zs,
            ..Default::default()
        };
        artifacts.routed = vec![Default::default(); layers + raft_layers];

        Self {
            models,
            conf,
            progress,
            cancel,
            layer_h,
            layers,
            raft_layers,
            extrusion_width: nozzle_diam(dflt_nozl),
            infill_width: nozzle_diam(infl_nozl),
            support_width: nozzle_diam(supp_nozl),
            dflt_nozl,
            infl_nozl,
            supp_nozl,
            skirt_bounds: Vec::new(),
            artifacts,
        }
    }

    /// Z of a print layer as sliced from the mesh (no raft offset).
    pub(crate) fn print_z(&self, layer: usize) -> f64 {
        self.layer_h * (layer as f64 + 1.0)
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), SlicerError> {
        if self.cancel.is_cancelled() {
            Err(SlicerError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn report(&self, phase: SlicePhase, done: usize, total: usize) {
        if let Some(callback) = self.progress {
            let callback: &dyn Fn(SliceProgress) = &**callback;
            callback(SliceProgress {
                phase,
                progress: if total == 0 { 1.0 } else { done as f32 / total as f32 },
                current_layer: Some(done as u32),
                total_layers: Some(total as u32),
            });
        }
    }

    /// Runs every stage in order. Artifacts are complete afterwards.
    pub fn run(&mut self) -> Result<(), SlicerError> {
        info!("slicing {} layers (+{} raft)", self.layers, self.raft_layers);
        self.run_perimeters()?;
        self.check_cancelled()?;
        self.run_support()?;
        self.check_cancelled()?;
        self.run_adhesion()?;
        self.check_cancelled()?;
        self.run_fill()?;
        self.check_cancelled()?;
        self.run_routing()?;
        self.check_cancelled()?;
        Ok(())
    }

    /// Convenience for stages that map every print layer in parallel.
    pub(crate) fn par_layers<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        (0..self.layers).into_par_iter().map(f).collect()
    }
}

/// The slicer front door: owns the models and configuration, prepares the
/// meshes, runs a [`SliceJob`], and hands the artifacts to the emitter.
pub struct Slicer {
    pub models: Vec<Mesh>,
    pub conf: SlicerConfig,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
}

impl Slicer {
    pub fn new(models: Vec<Mesh>, conf: SlicerConfig) -> Self {
        Self {
            models,
            conf,
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    /// Token that can be handed to another thread to stop the run at the
    /// next stage or layer boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Centers the models on the bed, drops them onto the plate, and
    /// builds their layer indexes.
    fn prepare(&mut self) {
        let layer_h = self.conf.get_float("layer_height");
        let center = (
            self.conf.get_float("bed_center_x"),
            self.conf.get_float("bed_center_y"),
        );
        for model in &mut self.models {
            let bb = model.points.bounds();
            model.center((center.0, center.1, (bb.maxz - bb.minz) / 2.0));
            model.assign_layers(layer_h);
        }
    }

    /// Runs the full pipeline and returns the per-layer artifacts.
    pub fn slice(&mut self) -> Result<SliceArtifacts, SlicerError> {
        self.prepare();
        let mut job = SliceJob::new(
            &self.models,
            &self.conf,
            self.progress.as_ref(),
            &self.cancel,
        );
        job.run()?;
        Ok(std::mem::take(&mut job.artifacts))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::cube_slicer;
    use super::*;
    use geom_types::{path_area, paths_bounds};

    #[test]
    fn cube_slices_to_expected_layer_count() {
        let mut slicer = cube_slicer(&[
            ("layer_height", "0.2"),
            ("shell_count", "2"),
            ("infill_type", "Lines"),
            ("infill_density", "30"),
            ("random_starts", "False"),
        ]);
        let artifacts = slicer.slice().expect("slicing succeeds");

        assert_eq!(artifacts.layer_paths.len(), 50);
        assert_eq!(artifacts.layer_zs.len(), 50);
        for layer in 0..50 {
            assert!(
                artifacts.dead_paths[layer].is_empty(),
                "dead paths at layer {}",
                layer
            );
            // Two concentric square shells.
            let shells = &artifacts.perimeter_paths[layer];
            assert_eq!(shells.len(), 2);
            assert_eq!(shells[0].len(), 1);
            assert_eq!(shells[1].len(), 1);
            // Outer shell inset by ew/2 from the 10mm outline, inner one ew
            // deeper; both nested, both nonzero.
            let outer_area = path_area(&shells[0][0]).abs();
            let inner_area = path_area(&shells[1][0]).abs();
            assert!(inner_area < outer_area, "layer {}", layer);
            // No supports requested or needed.
            assert!(artifacts.support_outline[layer].is_empty());
        }
        assert!(artifacts.degenerate_layers.is_empty());
        // Sparse infill exists in interior layers.
        assert!(!artifacts.sparse_infill[25].is_empty());
        assert_eq!(artifacts.routed.len(), 50);
    }

    #[test]
    fn shells_are_nested_and_centered_on_bed() {
        let mut slicer = cube_slicer(&[("shell_count", "3"), ("random_starts", "False")]);
        let artifacts = slicer.slice().unwrap();
        let shells = &artifacts.perimeter_paths[10];
        assert_eq!(shells.len(), 3);
        let mut last = f64::INFINITY;
        for shell in shells {
            let area: f64 = shell.iter().map(|p| path_area(p).abs()).sum();
            assert!(area < last, "inner shells must lose area");
            last = area;
        }
        // Bed center default is (100, 100).
        let (minx, miny, maxx, maxy) = paths_bounds(&artifacts.layer_paths[10]);
        assert!((minx + maxx - 200.0).abs() < 0.1);
        assert!((miny + maxy - 200.0).abs() < 0.1);
    }

    #[test]
    fn sub_layer_height_mesh_produces_zero_layers() {
        let mesh = crate::core::mesh::test_meshes::boxed([0.0, 0.0, 0.0], [10.0, 10.0, 0.1]);
        let mut conf = SlicerConfig::new();
        conf.set("layer_height", "0.2").unwrap();
        let mut slicer = Slicer::new(vec![mesh], conf);
        let artifacts = slicer.slice().unwrap();
        assert_eq!(artifacts.layer_paths.len(), 0);
        assert_eq!(artifacts.routed.len(), 0);
    }

    #[test]
    fn cancellation_stops_the_run() {
        let mut slicer = cube_slicer(&[]);
        slicer.cancel_token().cancel();
        assert!(matches!(slicer.slice(), Err(SlicerError::Cancelled)));
    }

    #[test]
    fn top_and_bottom_masks_mark_the_caps() {
        let mut slicer = cube_slicer(&[("random_starts", "False")]);
        let artifacts = slicer.slice().unwrap();
        let layers = artifacts.layer_paths.len();
        // The top layer is fully exposed above; a mid layer is not.
        let top_area: f64 = artifacts.top_masks[layers - 1]
            .iter()
            .map(|p| path_area(p).abs())
            .sum();
        let mid_area: f64 = artifacts.top_masks[layers / 2]
            .iter()
            .map(|p| path_area(p).abs())
            .sum();
        assert!(top_area > 80.0);
        assert!(mid_area < 1.0);
        let bot_area: f64 = artifacts.bot_masks[0].iter().map(|p| path_area(p).abs()).sum();
        assert!(bot_area > 80.0);
    }
}
