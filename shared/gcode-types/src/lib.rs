//! # Lamina G-code Types
//!
//! This library provides the command model for the Marlin-flavored G-code
//! that the lamina slicer emits. The slicer builds [`Command`] values and
//! renders them to text; viewers and analyzers can parse the same stream by
//! matching on the typed commands instead of re-tokenizing G-code.
//!
//! ## Dialect
//!
//! The emitted dialect is plain Marlin: absolute positioning (`G90`),
//! absolute extrusion (`M82`), metric units (`G21`), heated bed via
//! `M140`/`M190`, hotend via `M104`/`M109`, homing via `G28`, travel and
//! extrusion moves via `G0`/`G1` with feed rates in mm/min. Layer
//! boundaries are annotated with `;LAYER:n` and `;LAYER_COUNT:N` comments
//! for viewer compatibility.
//!
//! ## Usage Example
//!
//! ```rust
//! use gcode_types::Command;
//!
//! let cmd = Command::Extrude { x: 12.5, y: 7.25, e: 1.234, feed: 6000.0 };
//! assert_eq!(cmd.to_string(), "G1 X12.50 Y7.25 E1.234 F6000");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Formats a float without trailing zeroes or a dangling decimal point.
///
/// Feed rates and similar values print as `6000` rather than `6000.000000`.
pub fn float_fmt(val: f64) -> String {
    let s = format!("{:.6}", val);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// One Marlin command (or annotation comment) in the output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Free-form `;text` comment.
    Comment(String),
    /// `M82`: absolute extrusion distances.
    AbsoluteExtrusion,
    /// `G21`: millimeter units.
    MetricUnits,
    /// `G90`: absolute positioning.
    AbsolutePositioning,
    /// `M107`: part cooling fan off.
    FanOff,
    /// `M140`/`M190`: set bed temperature, optionally waiting for it.
    SetBedTemp { celsius: i64, wait: bool },
    /// `M104`/`M109`: set hotend temperature, optionally waiting for it.
    SetHotendTemp { celsius: i64, wait: bool },
    /// `G28 X0 Y0`: home the horizontal axes.
    HomeXY,
    /// `G28 Z0`: home the vertical axis.
    HomeZ,
    /// `G92 E0`: zero the extruder position.
    ZeroExtruder,
    /// `M117`: show a message on the printer display.
    DisplayMessage(String),
    /// `;LAYER_COUNT:n` annotation.
    LayerCount(u32),
    /// `;LAYER:n` annotation.
    LayerStart(u32),
    /// `T<n>`: select extruder.
    ToolChange(u8),
    /// `G0`: non-extruding XY travel. Feed in mm/min.
    Travel { x: f64, y: f64, feed: f64 },
    /// `G1 Z`: vertical move. Feed in mm/min.
    TravelZ { z: f64, feed: f64, note: Option<String> },
    /// `G1 E`: extruder-only move (retract or prime). Feed in mm/min.
    Extruder { e: f64, feed: f64 },
    /// `G1 X Y E`: extruding move. Feed in mm/min.
    Extrude { x: f64, y: f64, e: f64, feed: f64 },
}

impl Command {
    /// True for commands that move the toolhead.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Command::Travel { .. }
                | Command::TravelZ { .. }
                | Command::Extrude { .. }
                | Command::HomeXY
                | Command::HomeZ
        )
    }

    /// True for commands that feed or retract filament.
    pub fn is_extrusion(&self) -> bool {
        matches!(self, Command::Extruder { .. } | Command::Extrude { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Comment(text) => write!(f, ";{}", text),
            Command::AbsoluteExtrusion => write!(f, "M82 ;absolute extrusion mode"),
            Command::MetricUnits => write!(f, "G21 ;metric values"),
            Command::AbsolutePositioning => write!(f, "G90 ;absolute positioning"),
            Command::FanOff => write!(f, "M107 ;Fan off"),
            Command::SetBedTemp { celsius, wait: false } => {
                write!(f, "M140 S{} ;set bed temp", celsius)
            }
            Command::SetBedTemp { celsius, wait: true } => {
                write!(f, "M190 S{} ;wait for bed temp", celsius)
            }
            Command::SetHotendTemp { celsius, wait: false } => {
                write!(f, "M104 S{} ;set extruder temp", celsius)
            }
            Command::SetHotendTemp { celsius, wait: true } => {
                write!(f, "M109 S{} ;wait for extruder temp", celsius)
            }
            Command::HomeXY => write!(f, "G28 X0 Y0 ;auto-home XY axes"),
            Command::HomeZ => write!(f, "G28 Z0 ;auto-home Z axis"),
            Command::ZeroExtruder => write!(f, "G92 E0 ;Zero extruder"),
            Command::DisplayMessage(text) => write!(f, "M117 {}", text),
            Command::LayerCount(n) => write!(f, ";LAYER_COUNT:{}", n),
            Command::LayerStart(n) => write!(f, ";LAYER:{}", n),
            Command::ToolChange(n) => write!(f, "T{}", n),
            Command::Travel { x, y, feed } => {
                write!(f, "G0 X{:.2} Y{:.2} F{}", x, y, float_fmt(*feed))
            }
            Command::TravelZ { z, feed, note } => {
                write!(f, "G1 Z{:.2} F{}", z, float_fmt(*feed))?;
                if let Some(note) = note {
                    write!(f, " ;{}", note)?;
                }
                Ok(())
            }
            Command::Extruder { e, feed } => {
                write!(f, "G1 E{:.3} F{}", e, float_fmt(*feed))
            }
            Command::Extrude { x, y, e, feed } => {
                write!(f, "G1 X{:.2} Y{:.2} E{:.3} F{}", x, y, e, float_fmt(*feed))
            }
        }
    }
}
