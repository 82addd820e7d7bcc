//! Stage F: path routing.
//!
//! Collects each layer's printable geometry in priority order (priming,
//! raft, skirt, brim, support outline, support infill, perimeters
//! innermost first, solid infill, sparse infill) and greedily stitches
//! each group's paths end-to-end so the extruder wanders as little as
//! possible. Every group lands in its nozzle's slot with its extrusion
//! width.

use geom_types::{close_paths, Path, Point2};
use rayon::prelude::*;
use tracing::debug;

use crate::progress::SlicePhase;
use crate::SlicerError;

use super::{RoutedGroup, SliceJob, JOIN_THRESHOLD};

/// Greedily joins paths by nearest endpoints: grow the current path by
/// splicing whichever remaining path has an endpoint closest to either of
/// its ends (reversing as needed) while the gap stays within
/// [`JOIN_THRESHOLD`]; otherwise emit and restart.
pub(crate) fn join_paths(paths: &[Path]) -> Vec<Path> {
    let mut paths: Vec<Path> = paths.iter().filter(|p| !p.is_empty()).cloned().collect();
    let mut joined = Vec::new();
    if paths.is_empty() {
        return joined;
    }
    let mut path = paths.remove(0);
    while !paths.is_empty() {
        let mut best: Option<(usize, f64, bool, bool)> = None;
        for (i, cand) in paths.iter().enumerate() {
            for (end_a, pa) in [(false, path[0]), (true, path[path.len() - 1])] {
                for (end_b, pb) in [(false, cand[0]), (true, cand[cand.len() - 1])] {
                    let dist = pa.distance_to(&pb);
                    if best.map_or(true, |(_, d, _, _)| dist < d) {
                        best = Some((i, dist, end_a, end_b));
                    }
                }
            }
        }
        let Some((idx, dist, end_a, end_b)) = best else {
            break;
        };
        if dist <= JOIN_THRESHOLD {
            let mut other = paths.remove(idx);
            if end_a {
                if end_b {
                    other.reverse();
                }
                path.extend(other);
            } else {
                if !end_b {
                    other.reverse();
                }
                other.extend(path);
                path = other;
            }
        } else {
            // Move the nearest candidate to the front, turned so its close
            // end leads, and start a fresh path from it.
            let mut other = paths.remove(idx);
            if end_a == end_b {
                other.reverse();
            }
            paths.insert(0, other);
            joined.push(std::mem::replace(&mut path, paths.remove(0)));
        }
    }
    joined.push(path);
    joined
}

impl<'a> SliceJob<'a> {
    fn add_routed(&mut self, layer: usize, paths: &[Path], width: f64, nozzle: usize) {
        if paths.is_empty() || layer >= self.artifacts.routed.len() {
            return;
        }
        let joined = join_paths(paths);
        if joined.is_empty() {
            return;
        }
        self.artifacts.routed[layer][nozzle.min(3)].push(RoutedGroup { paths: joined, width });
    }

    /// Nozzle-priming zigzags along the bed margin, one lane per active
    /// extruder.
    fn priming_paths(&self) -> Vec<(usize, Path)> {
        let mut prime_nozls = vec![self.conf.get_int("default_nozzle").max(0) as usize];
        if self.conf.get_int("infill_nozzle") != -1 {
            prime_nozls.push(self.conf.get_int("infill_nozzle") as usize);
        }
        if self.conf.get_int("support_nozzle") != -1 {
            prime_nozls.push(self.conf.get_int("support_nozzle") as usize);
        }
        let center_x = self.conf.get_float("bed_center_x");
        let center_y = self.conf.get_float("bed_center_y");
        let size_x = self.conf.get_float("bed_size_x");
        let size_y = self.conf.get_float("bed_size_y");
        let minx = center_x - size_x / 2.0;
        let maxx = center_x + size_x / 2.0;
        let miny = center_y - size_y / 2.0;
        let maxy = center_y + size_y / 2.0;
        let rect_bed = self.conf.get_str("bed_geometry") == "Rectangular";
        let maxlen = if rect_bed {
            maxy - miny - 20.0
        } else {
            2.0 * std::f64::consts::PI * (size_x * size_x / 2.0).sqrt() - 20.0
        };
        if maxlen <= 0.0 {
            return Vec::new();
        }
        let reps = self.conf.get_float("prime_length") / maxlen;
        let ireps = reps.ceil() as usize;
        let ewidth = self.extrusion_width * 1.25;

        let mut out = Vec::new();
        for (noznum, &nozl) in prime_nozls.iter().enumerate() {
            let mut path: Path = Vec::new();
            for rep in 0..ireps {
                if rect_bed {
                    let x = minx + 5.0 + (noznum as f64 * reps + rep as f64 + 1.0) * ewidth;
                    let (y1, y2) = if rep % 2 == 0 {
                        (miny + 10.0, maxy - 10.0)
                    } else {
                        (maxy - 10.0, miny + 10.0)
                    };
                    path.push(Point2::new(x, y1));
                    if rep == ireps - 1 {
                        let part = reps - reps.floor();
                        let part = if part == 0.0 { 1.0 } else { part };
                        path.push(Point2::new(x, y1 + (y2 - y1) * part));
                    } else {
                        path.push(Point2::new(x, y2));
                    }
                } else {
                    let r = maxx - 5.0 - (noznum as f64 * reps + rep as f64 + 1.0) * ewidth;
                    let part = if rep == ireps - 1 { reps - reps.floor() } else { 1.0 };
                    let part = if part == 0.0 { 1.0 } else { part };
                    let steps = (2.0 * std::f64::consts::PI * r * part / 4.0).floor().max(1.0);
                    let stepang = 2.0 * std::f64::consts::PI / steps;
                    for i in 0..steps as usize {
                        let ang = i as f64 * stepang;
                        path.push(Point2::new(
                            center_x + r * ang.cos(),
                            center_y + r * ang.sin(),
                        ));
                    }
                }
            }
            out.push((nozl, path));
        }
        out
    }

    pub(crate) fn run_routing(&mut self) -> Result<(), SlicerError> {
        if self.artifacts.routed.is_empty() {
            return Ok(());
        }
        let skirt_layers = self.conf.get_int("skirt_layers").max(0) as usize;
        let ew = self.extrusion_width;
        let iw = self.infill_width;
        let sw = self.support_width;
        let (dflt, infl, supp) = (self.dflt_nozl, self.infl_nozl, self.supp_nozl);

        // Layer-0 prefix: priming lanes, then the raft base. The brim is
        // routed inside the per-layer pass so the skirt precedes it.
        for (nozl, path) in self.priming_paths() {
            self.add_routed(0, &[path], self.extrusion_width * 1.25, nozl);
        }
        let raft_outline = close_paths(&self.artifacts.raft_outline);
        self.add_routed(0, &raft_outline, sw, supp);
        for layer in 0..self.raft_layers {
            let fill = self.artifacts.raft_infill.get(layer).cloned().unwrap_or_default();
            self.add_routed(layer, &fill, sw, supp);
        }

        // Print layers, routed in parallel and appended in order after the
        // prefix groups.
        let skirt = close_paths(&self.artifacts.skirt_paths);
        let brim = close_paths(&self.artifacts.brim_paths);
        let raft_layers = self.raft_layers;
        let per_layer: Vec<Vec<(usize, Vec<Path>, f64)>> = (0..self.layers)
            .into_par_iter()
            .map(|slicenum| {
                let mut groups: Vec<(usize, Vec<Path>, f64)> = Vec::new();
                let layer = raft_layers + slicenum;
                if !skirt.is_empty() && layer < skirt_layers + raft_layers {
                    groups.push((supp, join_paths(&skirt), sw));
                }
                if layer == 0 && !brim.is_empty() {
                    groups.push((supp, join_paths(&brim), sw));
                }
                let outline = close_paths(&self.artifacts.support_outline[slicenum]);
                if !outline.is_empty() {
                    groups.push((supp, join_paths(&outline), sw));
                }
                let support_fill = &self.artifacts.support_infill[slicenum];
                if !support_fill.is_empty() {
                    groups.push((supp, join_paths(support_fill), sw));
                }
                // Innermost shell first, working outward.
                for shell in self.artifacts.perimeter_paths[slicenum].iter().rev() {
                    let shell = close_paths(shell);
                    if !shell.is_empty() {
                        groups.push((dflt, join_paths(&shell), ew));
                    }
                }
                let solid = &self.artifacts.solid_infill[slicenum];
                if !solid.is_empty() {
                    groups.push((dflt, join_paths(solid), ew));
                }
                let sparse = &self.artifacts.sparse_infill[slicenum];
                if !sparse.is_empty() {
                    groups.push((infl, join_paths(sparse), iw));
                }
                self.report(SlicePhase::Pathing, slicenum, self.layers);
                groups
            })
            .collect();
        self.check_cancelled()?;

        for (slicenum, groups) in per_layer.into_iter().enumerate() {
            let layer = raft_layers + slicenum;
            for (nozl, paths, width) in groups {
                if !paths.is_empty() {
                    self.artifacts.routed[layer][nozl.min(3)]
                        .push(RoutedGroup { paths, width });
                }
            }
        }
        debug!("routing complete for {} output layers", self.artifacts.routed.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::cube_slicer;
    use super::*;

    fn line(a: (f64, f64), b: (f64, f64)) -> Path {
        vec![Point2::new(a.0, a.1), Point2::new(b.0, b.1)]
    }

    #[test]
    fn join_stitches_collinear_segments() {
        // Three segments forming one line, each endpoint within 2mm.
        let paths = vec![
            line((0.0, 0.0), (10.0, 0.0)),
            line((10.5, 0.0), (20.0, 0.0)),
            line((20.5, 0.0), (30.0, 0.0)),
        ];
        let joined = join_paths(&paths);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].len(), 6);
        assert_eq!(joined[0][0], Point2::new(0.0, 0.0));
        assert_eq!(joined[0][5], Point2::new(30.0, 0.0));
    }

    #[test]
    fn join_reverses_paths_when_needed() {
        // The second path runs the wrong way; stitching must flip it.
        let paths = vec![
            line((0.0, 0.0), (10.0, 0.0)),
            line((20.0, 0.0), (10.5, 0.0)),
        ];
        let joined = join_paths(&paths);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].last(), Some(&Point2::new(20.0, 0.0)));
    }

    #[test]
    fn join_splits_on_distant_paths() {
        let paths = vec![
            line((0.0, 0.0), (10.0, 0.0)),
            line((50.0, 50.0), (60.0, 50.0)),
        ];
        let joined = join_paths(&paths);
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn routed_layers_follow_priority_order() {
        let mut slicer = cube_slicer(&[
            ("infill_density", "20"),
            ("skirt_layers", "1"),
            ("random_starts", "False"),
        ]);
        let artifacts = slicer.slice().unwrap();
        // Layer 0 leads with the priming lane (width 0.625), then skirt,
        // shells, and solid infill at the 0.5mm extrusion width.
        let groups = &artifacts.routed[0][0];
        assert!(groups.len() >= 5);
        assert!((groups[0].width - 0.625).abs() < 1e-9);
        for group in &groups[1..] {
            assert!((group.width - 0.5).abs() < 1e-9);
            assert!(!group.paths.is_empty());
        }
        // Interior layer: shells plus sparse infill, no skirt.
        let mid = &artifacts.routed[25][0];
        assert_eq!(mid.len(), 3); // 2 shells + sparse infill
    }

    #[test]
    fn skirt_is_routed_before_brim_on_layer_zero() {
        let mut slicer = cube_slicer(&[
            ("adhesion_type", "Brim"),
            ("brim_width", "2.0"),
            ("skirt_layers", "1"),
            ("random_starts", "False"),
        ]);
        let artifacts = slicer.slice().unwrap();
        let groups = &artifacts.routed[0][0];
        assert!(groups.len() >= 5);
        assert!((groups[0].width - 0.625).abs() < 1e-9); // priming lane
        // Priming, then skirt, then brim: the skirt loop (model outline
        // pushed out past the brim) spans wider than the widest brim ring.
        let extent = |group: &RoutedGroup| {
            let (minx, _, maxx, _) = geom_types::paths_bounds(&group.paths);
            maxx - minx
        };
        let skirt_extent = extent(&groups[1]);
        let brim_extent = extent(&groups[2]);
        assert!((skirt_extent - 14.5).abs() < 0.1, "skirt extent {}", skirt_extent);
        assert!((brim_extent - 13.5).abs() < 0.1, "brim extent {}", brim_extent);
        assert!(brim_extent < skirt_extent);
    }

    #[test]
    fn priming_added_when_prime_length_set() {
        let mut slicer = cube_slicer(&[("prime_length", "100"), ("random_starts", "False")]);
        let artifacts = slicer.slice().unwrap();
        let first = &artifacts.routed[0][0][0];
        // The priming lane hugs the bed's left margin (bed spans 0..200).
        assert!(first.paths[0][0].x < 10.0);
        // And runs the configured length, within a lane's slack.
        let len: f64 = first.paths.iter().map(geom_types::path_length).sum();
        assert!(len >= 100.0 - 1.0);
    }
}
