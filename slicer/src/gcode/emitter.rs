//! Routed paths to Marlin commands.
//!
//! The emitter walks output layers in ascending Z, scheduling travels,
//! retraction, and extruding moves for every routed group. It owns the
//! motion state: the last position, the absolute extruder position, the
//! active nozzle, and the running build-time estimate.
//!
//! Extruded filament length uses the elliptical bead cross-section
//! `π·(ew/2)·(h/2)` scaled by the filament's own cross-section, so the
//! E axis advances by `distance · bead_xsect / filament_xsect` per move.

use std::f64::consts::PI;
use std::io::{self, Write};

use gcode_types::Command;
use geom_types::Path;

use crate::config::SlicerConfig;
use crate::pipeline::SliceArtifacts;

/// Marlin command generator with motion and extrusion state.
pub struct GCodeEmitter<'a> {
    conf: &'a SlicerConfig,
    last_pos: (f64, f64, f64),
    last_e: f64,
    last_nozzle: usize,
    total_build_time: f64,
}

impl<'a> GCodeEmitter<'a> {
    pub fn new(conf: &'a SlicerConfig) -> Self {
        Self {
            conf,
            last_pos: (0.0, 0.0, 0.0),
            last_e: 0.0,
            last_nozzle: 0,
            total_build_time: 0.0,
        }
    }

    /// Estimated build time so far, in seconds.
    pub fn build_time(&self) -> f64 {
        self.total_build_time
    }

    /// Net filament pushed through the nozzle so far, in millimeters of
    /// filament.
    pub fn extruded_filament(&self) -> f64 {
        self.last_e
    }

    fn header(&self, total_layers: u32) -> Vec<Command> {
        let mut out = vec![
            Command::Comment("FLAVOR:Marlin".to_string()),
            Command::Comment(format!(
                "Layer height: {:.2}",
                self.conf.get_float("layer_height")
            )),
            Command::AbsoluteExtrusion,
            Command::MetricUnits,
            Command::AbsolutePositioning,
            Command::FanOff,
        ];
        let bed_temp = self.conf.get_int("bed_temp");
        if bed_temp > 0 {
            out.push(Command::SetBedTemp { celsius: bed_temp, wait: false });
            out.push(Command::SetBedTemp { celsius: bed_temp, wait: true });
        }
        let hotend = self.conf.get_int("nozzle_0_temp");
        out.push(Command::SetHotendTemp { celsius: hotend, wait: false });
        out.push(Command::SetHotendTemp { celsius: hotend, wait: true });
        out.push(Command::HomeXY);
        out.push(Command::HomeZ);
        out.push(Command::TravelZ {
            z: 15.0,
            feed: 6000.0,
            note: Some("raise extruder".to_string()),
        });
        out.push(Command::ZeroExtruder);
        out.push(Command::DisplayMessage("Printing...".to_string()));
        out.push(Command::LayerCount(total_layers));
        out
    }

    fn footer(&self) -> Vec<Command> {
        vec![
            Command::FanOff,
            Command::SetHotendTemp { celsius: 0, wait: false },
            Command::SetBedTemp { celsius: 0, wait: false },
            Command::DisplayMessage("Print complete".to_string()),
        ]
    }

    fn tool_change(&mut self, nozzle: usize) -> Vec<Command> {
        if self.last_nozzle == nozzle {
            return Vec::new();
        }
        let retract = self.conf.get_float("retract_extruder");
        let speed = self.conf.get_float("retract_speed").max(1.0);
        let out = vec![
            Command::Extruder { e: self.last_e - retract, feed: speed * 60.0 },
            Command::ToolChange(nozzle as u8),
            Command::Extruder { e: self.last_e, feed: speed * 60.0 },
        ];
        self.total_build_time += 2.0 * retract / speed;
        self.last_nozzle = nozzle;
        out
    }

    /// Commands for one routed group: travel to each path, prime, extrude
    /// along it, retract.
    pub fn path_group(&mut self, paths: &[Path], ewidth: f64, nozzle: usize, z: f64) -> Vec<Command> {
        let fil_diam = self.conf.get_float(&format!("nozzle_{}_filament", nozzle));
        let max_speed = self.conf.get_float(&format!("nozzle_{}_max_speed", nozzle));
        let layer_h = self.conf.get_float("layer_height");
        let retract_dist = if self.conf.get_bool("retract_enable") {
            self.conf.get_float("retract_dist")
        } else {
            0.0
        };
        let retract_speed = self.conf.get_float("retract_speed").max(1.0);
        let retract_lift = self.conf.get_float("retract_lift");
        let feed_rate = self.conf.get_float("feed_rate").max(1.0);
        let travel_xy = self.conf.get_float("travel_rate_xy").max(1.0);
        let travel_z = self.conf.get_float("travel_rate_z").max(0.1);

        let xsect = PI * (ewidth / 2.0) * (layer_h / 2.0);
        let fil_xsect = PI * (fil_diam / 2.0) * (fil_diam / 2.0);

        let mut out = self.tool_change(nozzle);
        for path in paths {
            let Some(first) = path.first() else {
                continue;
            };
            if retract_lift > 0.0 || self.last_pos.2 != z {
                self.total_build_time += retract_lift.abs() / travel_z;
                out.push(Command::TravelZ { z: z + retract_lift, feed: travel_z * 60.0, note: None });
            }
            let travel = (self.last_pos.0 - first.x).hypot(self.last_pos.1 - first.y);
            self.total_build_time += travel / travel_xy;
            out.push(Command::Travel { x: first.x, y: first.y, feed: travel_xy * 60.0 });
            if retract_lift > 0.0 {
                self.total_build_time += retract_lift.abs() / travel_z;
                out.push(Command::TravelZ { z, feed: travel_z * 60.0, note: None });
            }
            if retract_dist > 0.0 {
                self.total_build_time += retract_dist / retract_speed;
                self.last_e += retract_dist;
                out.push(Command::Extruder { e: self.last_e, feed: retract_speed * 60.0 });
            }
            let (mut ox, mut oy) = (first.x, first.y);
            for pt in &path[1..] {
                let dist = (pt.x - ox).hypot(pt.y - oy);
                let fil_dist = dist * xsect / fil_xsect;
                let speed = feed_rate.min(max_speed) * 60.0;
                self.total_build_time += dist / feed_rate;
                self.last_e += fil_dist;
                out.push(Command::Extrude { x: pt.x, y: pt.y, e: self.last_e, feed: speed });
                self.last_pos = (pt.x, pt.y, z);
                ox = pt.x;
                oy = pt.y;
            }
            if retract_dist > 0.0 {
                self.total_build_time += retract_dist / retract_speed;
                self.last_e -= retract_dist;
                out.push(Command::Extruder { e: self.last_e, feed: retract_speed * 60.0 });
            }
        }
        out
    }

    /// Writes the complete G-code stream for the routed artifacts.
    pub fn emit<W: Write>(&mut self, writer: &mut W, artifacts: &SliceArtifacts) -> io::Result<()> {
        let total_layers = artifacts.routed.len() as u32;
        let raft_layers = artifacts.routed.len().saturating_sub(artifacts.layer_paths.len());
        for cmd in self.header(total_layers) {
            writeln!(writer, "{}", cmd)?;
        }
        for (layer, nozzles) in artifacts.routed.iter().enumerate() {
            writeln!(writer, "{}", Command::LayerStart(layer as u32))?;
            let print_layer = layer.checked_sub(raft_layers).map(|l| l as u32);
            if let Some(print_layer) = print_layer {
                if artifacts.degenerate_layers.contains(&print_layer) {
                    writeln!(
                        writer,
                        "{}",
                        Command::Comment("WARN: incomplete outline on this layer".to_string())
                    )?;
                }
            }
            let z = artifacts.layer_zs[layer];
            for (nozzle, groups) in nozzles.iter().enumerate() {
                if groups.is_empty() {
                    continue;
                }
                writeln!(writer, "{}", Command::Comment(format!("nozzle:{}", nozzle)))?;
                for group in groups {
                    for cmd in self.path_group(&group.paths, group.width, nozzle, z) {
                        writeln!(writer, "{}", cmd)?;
                    }
                }
            }
        }
        for cmd in self.footer() {
            writeln!(writer, "{}", cmd)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RoutedGroup;
    use geom_types::Point2;

    fn square_path(size: f64) -> Path {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
            Point2::new(0.0, 0.0),
        ]
    }

    fn artifacts_with_one_group(group: RoutedGroup) -> SliceArtifacts {
        SliceArtifacts {
            layer_paths: vec![Vec::new()],
            layer_zs: vec![0.2],
            routed: vec![[vec![group], Vec::new(), Vec::new(), Vec::new()]],
            ..Default::default()
        }
    }

    #[test]
    fn header_and_footer_only_for_empty_artifacts() {
        let conf = SlicerConfig::new();
        let mut emitter = GCodeEmitter::new(&conf);
        let mut out = Vec::new();
        emitter.emit(&mut out, &SliceArtifacts::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(";LAYER_COUNT:0"));
        assert!(text.contains("M82 ;absolute extrusion mode"));
        assert!(text.contains("G90 ;absolute positioning"));
        assert!(text.contains("M190 S70 ;wait for bed temp"));
        assert!(text.contains("G28 X0 Y0"));
        assert!(!text.contains("G1 X"));
        assert_eq!(emitter.extruded_filament(), 0.0);
    }

    #[test]
    fn extrusion_accounting_matches_path_length() {
        let mut conf = SlicerConfig::new();
        conf.set("retract_enable", "False").unwrap();
        conf.set("bed_temp", "0").unwrap();
        let mut emitter = GCodeEmitter::new(&conf);
        let group = RoutedGroup { paths: vec![square_path(10.0)], width: 0.5 };
        let mut out = Vec::new();
        emitter.emit(&mut out, &artifacts_with_one_group(group)).unwrap();

        // 40mm of bead at layer height 0.2, width 0.5, filament 1.75mm.
        let xsect = PI * 0.25 * 0.1;
        let fil_xsect = PI * 0.875 * 0.875;
        let expected = 40.0 * xsect / fil_xsect;
        assert!((emitter.extruded_filament() - expected).abs() < 1e-9);
        let text = String::from_utf8(out).unwrap();
        // With bed_temp 0 no bed commands appear.
        assert!(!text.contains("M140"));
        assert!(text.contains(";LAYER:0"));
        assert!(text.contains("G0 X0.00 Y0.00 F6000"));
    }

    #[test]
    fn retraction_bounces_cancel_out() {
        let mut conf = SlicerConfig::new();
        conf.set("retract_dist", "5").unwrap();
        let mut emitter = GCodeEmitter::new(&conf);
        let group = RoutedGroup { paths: vec![square_path(10.0)], width: 0.5 };
        let mut out = Vec::new();
        emitter.emit(&mut out, &artifacts_with_one_group(group)).unwrap();
        let xsect = PI * 0.25 * 0.1;
        let fil_xsect = PI * 0.875 * 0.875;
        let expected = 40.0 * xsect / fil_xsect;
        // Prime and retract cancel; net E is the extruded filament.
        assert!((emitter.extruded_filament() - expected).abs() < 1e-9);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("G1 E5.000 F3000"));
    }

    #[test]
    fn build_time_is_monotonic() {
        let conf = SlicerConfig::new();
        let mut emitter = GCodeEmitter::new(&conf);
        assert_eq!(emitter.build_time(), 0.0);
        let cmds = emitter.path_group(&[square_path(10.0)], 0.5, 0, 0.2);
        assert!(!cmds.is_empty());
        let after_one = emitter.build_time();
        assert!(after_one > 0.0);
        emitter.path_group(&[square_path(10.0)], 0.5, 0, 0.4);
        assert!(emitter.build_time() > after_one);
    }

    #[test]
    fn tool_change_emits_t_and_reprime() {
        let conf = SlicerConfig::new();
        let mut emitter = GCodeEmitter::new(&conf);
        // First group on nozzle 0: no tool change commands.
        let cmds = emitter.path_group(&[square_path(5.0)], 0.5, 0, 0.2);
        assert!(!cmds.iter().any(|c| matches!(c, Command::ToolChange(_))));
        // Switch to nozzle 1: the retract / T1 / de-retract bracket leads.
        let cmds = emitter.path_group(&[square_path(5.0)], 0.5, 1, 0.2);
        assert!(matches!(cmds[0], Command::Extruder { .. }));
        assert!(matches!(cmds[1], Command::ToolChange(1)));
        assert!(matches!(cmds[2], Command::Extruder { .. }));
    }

    #[test]
    fn tool_change_bracket_survives_zero_retract() {
        let mut conf = SlicerConfig::new();
        conf.set("retract_extruder", "0").unwrap();
        let mut emitter = GCodeEmitter::new(&conf);
        let e_before = emitter.extruded_filament();
        let cmds = emitter.path_group(&[square_path(5.0)], 0.5, 2, 0.2);
        // The bracket still appears, with zero-magnitude extruder moves.
        assert!(matches!(cmds[1], Command::ToolChange(2)));
        match (&cmds[0], &cmds[2]) {
            (Command::Extruder { e: e1, .. }, Command::Extruder { e: e2, .. }) => {
                assert_eq!(*e1, e_before);
                assert_eq!(*e2, e_before);
            }
            other => panic!("expected extruder bracket, got {:?}", other),
        }
    }

    #[test]
    fn feed_rate_respects_nozzle_speed_limit() {
        let mut conf = SlicerConfig::new();
        conf.set("feed_rate", "200").unwrap();
        conf.set("nozzle_0_max_speed", "50").unwrap();
        let mut emitter = GCodeEmitter::new(&conf);
        let cmds = emitter.path_group(&[square_path(5.0)], 0.5, 0, 0.2);
        let extrude_feeds: Vec<f64> = cmds
            .iter()
            .filter_map(|c| match c {
                Command::Extrude { feed, .. } => Some(*feed),
                _ => None,
            })
            .collect();
        assert!(!extrude_feeds.is_empty());
        assert!(extrude_feeds.iter().all(|f| (*f - 3000.0).abs() < 1e-9));
    }
}
