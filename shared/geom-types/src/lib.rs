//! # Lamina Geometry Types
//!
//! This library provides the geometry primitives shared between the lamina
//! slicer and any tooling that consumes its per-layer output (viewers,
//! analyzers). These types are deliberately small and dependency-light: the
//! slicer's mesh caches, the planar boolean adapter, and the G-code emitter
//! all build on them.
//!
//! ## Coordinate conventions
//!
//! - All coordinates are f64 millimeters.
//! - 3D points are considered equal when their components match after
//!   rounding to four decimal places (about 0.1 µm). That rounded triple is
//!   also the key used by the slicer's point cache.
//! - 3D ordering is reversed-lexicographic: Z is compared first, then Y,
//!   then X. Edge endpoints and triangle vertex rotations are canonicalized
//!   under this ordering.
//! - Layer outlines are counter-clockwise for outer shells; walking a path
//!   keeps solid on the left.
//!
//! ## Usage Example
//!
//! ```rust
//! use geom_types::{Point3, Vector3, triangle};
//!
//! let verts = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(10.0, 0.0, 0.0),
//!     Point3::new(0.0, 0.0, 10.0),
//! ];
//! let norm = Vector3::new(0.0, -1.0, 0.0);
//! let seg = triangle::slice_at_z(&verts, &norm, 5.0, 1e-3);
//! assert!(seg.is_some());
//! ```

pub mod path2d;
pub mod point;
pub mod triangle;
pub mod vector;

pub use path2d::{
    close_path, close_paths, path_area, path_is_ccw, path_length, paths_bounds, point_in_path,
    point_in_paths, Bounds2, Path, Pathset, Point2,
};
pub use point::{quant3, quant4, Point3, PointKey};
pub use vector::{Vector2, Vector3};
