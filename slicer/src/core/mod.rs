//! # Core Mesh Model
//!
//! The mesh data model and its file I/O:
//!
//! - **cache**: the three deduplicating arenas (points, edges, triangles)
//!   with reference counts and reverse indices
//! - **mesh**: the composed model with manifold validation, transforms,
//!   the layer index, and planar cross-sectioning
//! - **mesh_loader**: format readers (STL/OBJ/OFF/3MJ) and STL writers

pub mod cache;
pub mod mesh;
pub mod mesh_loader;

pub use cache::{Aabb, EdgeCache, EdgeIndex, PointCache, PointIndex, TriangleCache, TriangleIndex};
pub use mesh::{Mesh, Z_QUANTUM};
pub use mesh_loader::{
    detect_format, read_mesh, write_stl_ascii, write_stl_binary, MeshFormat, MeshLoadError,
};
