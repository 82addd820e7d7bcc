//! # Output Generation
//!
//! Consumers of the routed per-layer path groups:
//!
//! - **emitter**: Marlin G-code with extrusion accounting and build-time
//!   estimation
//! - **svg**: a layered SVG rendering of the same paths

pub mod emitter;
pub mod svg;

pub use emitter::GCodeEmitter;
pub use svg::write_svg;
