//! # Lamina Slicer Library
//!
//! This library converts triangulated 3D surface meshes into fused-filament
//! extrusion toolpaths and Marlin-flavored G-code.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **core**: the mesh data model: deduplicating point/edge/triangle
//!   caches, manifold validation, layer indexing, planar cross-sectioning,
//!   and mesh file I/O
//! - **geom2d**: the planar boolean adapter over the polygon engine, plus
//!   infill pattern generation
//! - **pipeline**: the slicing stages, from perimeters through routed
//!   per-layer path groups
//! - **gcode**: motion command emission with extrusion accounting and
//!   build-time estimation, plus SVG output
//! - **config**: the declarative option schema and its persistence
//! - **progress**: progress callbacks and cooperative cancellation
//!
//! ## Slicing Workflow
//!
//! 1. Load a model file ([`core::read_mesh`])
//! 2. Validate it is manifold ([`core::Mesh::check_manifold`])
//! 3. Build a [`Slicer`] from the models and a [`SlicerConfig`]
//! 4. Run [`Slicer::slice`] to produce per-layer [`SliceArtifacts`]
//! 5. Feed the artifacts to [`gcode::GCodeEmitter`] (or
//!    [`gcode::write_svg`])
//!
//! ## Usage Example
//!
//! ```no_run
//! use lamina_slicer::{config::SlicerConfig, core::read_mesh, Slicer};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut mesh = read_mesh(std::path::Path::new("model.stl"))?;
//! if !mesh.check_manifold() {
//!     eprintln!("model is not watertight");
//! }
//! let mut slicer = Slicer::new(vec![mesh], SlicerConfig::new());
//! let artifacts = slicer.slice()?;
//! println!("sliced {} layers", artifacts.layer_zs.len());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod config;
pub mod core;
pub mod gcode;
pub mod geom2d;
pub mod pipeline;
pub mod progress;

pub use config::SlicerConfig;
pub use pipeline::{RoutedGroup, SliceArtifacts, Slicer};
pub use progress::{CancelToken, ProgressCallback, SlicePhase, SliceProgress};

/// Result of a complete slice-to-file run.
#[derive(Debug, Clone)]
pub struct SliceSummary {
    /// Output layers written, raft included.
    pub layer_count: u32,
    /// Estimated print time from the emitter's motion accounting.
    pub estimated_build_time: Duration,
    /// Wall-clock time spent slicing.
    pub elapsed: Duration,
    /// Print layers whose cross-section did not close cleanly.
    pub degenerate_layers: Vec<u32>,
    /// Where the output was written.
    pub output_path: PathBuf,
}

/// Errors that abort a slicing run.
#[derive(Debug, thiserror::Error)]
pub enum SlicerError {
    #[error(
        "model is not manifold: {dupe_triangles} duplicate faces, \
         {hole_edges} hole edges, {excess_edges} overshared edges"
    )]
    NonManifold {
        dupe_triangles: usize,
        hole_edges: usize,
        excess_edges: usize,
    },

    #[error("slicing cancelled")]
    Cancelled,

    #[error(transparent)]
    MeshLoad(#[from] core::MeshLoadError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
