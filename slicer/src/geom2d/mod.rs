//! # Planar Boolean Adapter
//!
//! The slicer's window onto the 2D polygon engine. All callers work in
//! millimeter f64 paths; conversion into the engine's fixed-point space
//! happens inside this module and nothing engine-specific leaks out.
//!
//! The fill rule is even-odd throughout: a pathset is a polygon with holes
//! where membership flips at every crossed ring. After [`orient_paths`],
//! outer shells wind counter-clockwise and holes clockwise.
//!
//! Open subjects (infill lines clipped to a mask) are handled here as
//! well: the engine's high-level API only returns closed solutions, so
//! open polylines are cut span-by-span against the clip rings with an
//! even-odd midpoint test, which matches what the integer engine's
//! poly-tree output would produce for line subjects.

pub mod infill;

use clipper2::{inflate, EndType, FillRule, JoinType, Paths};
use geom_types::{path_is_ccw, point_in_path, point_in_paths, Path, Pathset, Point2};
use tracing::warn;

pub use geom_types::{close_path, close_paths, paths_bounds, Bounds2};

/// Joint style for [`offset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStyle {
    Square,
    Miter,
}

/// Tolerance for span de-duplication when cutting open polylines.
const SPAN_EPSILON: f64 = 1e-9;

fn to_engine(paths: &Pathset) -> Paths {
    let tuples: Vec<Vec<(f64, f64)>> = paths
        .iter()
        .map(|path| path.iter().map(|pt| (pt.x, pt.y)).collect())
        .collect();
    Paths::from(tuples)
}

fn from_engine(paths: Paths) -> Pathset {
    let tuples: Vec<Vec<(f64, f64)>> = paths.into();
    tuples
        .into_iter()
        .map(|path| path.into_iter().map(Point2::from).collect())
        .collect()
}

/// Offsets closed polygons outward (positive delta) or inward (negative).
/// Inputs are rewound to outer-CCW/hole-CW first, since inflation
/// direction follows ring orientation.
pub fn offset(paths: &Pathset, delta: f64, join: JoinStyle) -> Pathset {
    if paths.is_empty() {
        return Vec::new();
    }
    let join_type = match join {
        JoinStyle::Square => JoinType::Square,
        JoinStyle::Miter => JoinType::Miter,
    };
    let oriented = orient_paths(paths);
    from_engine(inflate(to_engine(&oriented), delta, join_type, EndType::Polygon, 2.0))
}

/// Even-odd union of two pathsets.
pub fn union(a: &Pathset, b: &Pathset) -> Pathset {
    if a.is_empty() {
        return b.clone();
    }
    if b.is_empty() {
        return a.clone();
    }
    match clipper2::union(to_engine(a), to_engine(b), FillRule::EvenOdd) {
        Ok(out) => from_engine(out),
        Err(err) => {
            warn!("polygon union failed: {}", err);
            a.clone()
        }
    }
}

/// Even-odd difference. Closed subjects go through the engine; open
/// subjects keep the polyline spans outside the clip.
pub fn difference(subj: &Pathset, clip: &Pathset, subj_closed: bool) -> Pathset {
    if subj.is_empty() {
        return Vec::new();
    }
    if clip.is_empty() {
        return subj.clone();
    }
    if !subj_closed {
        return clip_open_paths(subj, clip, false);
    }
    match clipper2::difference(to_engine(subj), to_engine(clip), FillRule::EvenOdd) {
        Ok(out) => from_engine(out),
        Err(err) => {
            warn!("polygon difference failed: {}", err);
            subj.clone()
        }
    }
}

/// Even-odd intersection. Closed subjects go through the engine; open
/// subjects keep the polyline spans inside the clip.
pub fn intersection(subj: &Pathset, clip: &Pathset, subj_closed: bool) -> Pathset {
    if subj.is_empty() || clip.is_empty() {
        return Vec::new();
    }
    if !subj_closed {
        return clip_open_paths(subj, clip, true);
    }
    match clipper2::intersect(to_engine(subj), to_engine(clip), FillRule::EvenOdd) {
        Ok(out) => from_engine(out),
        Err(err) => {
            warn!("polygon intersection failed: {}", err);
            Vec::new()
        }
    }
}

fn orient_path(path: Path, ccw: bool) -> Path {
    if path_is_ccw(&path) != ccw {
        path.into_iter().rev().collect()
    } else {
        path
    }
}

/// Rewinds paths so outer shells are counter-clockwise and holes (paths
/// enclosed by an odd number of the others) are clockwise.
pub fn orient_paths(paths: &Pathset) -> Pathset {
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let Some(first) = path.first() else {
                return path.clone();
            };
            let enclosures = paths
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && point_in_path(first, other))
                .count();
            orient_path(path.clone(), enclosures % 2 == 0)
        })
        .collect()
}

/// Even-odd containment of a point in a pathset.
pub fn paths_contain(pt: &Point2, paths: &Pathset) -> bool {
    point_in_paths(pt, paths)
}

/// Parameter of the crossing between subject segment `a->b` and clip edge
/// `c->d`, if any.
fn crossing_param(a: Point2, b: Point2, c: Point2, d: Point2) -> Option<f64> {
    let r = (b.x - a.x, b.y - a.y);
    let s = (d.x - c.x, d.y - c.y);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom.abs() < SPAN_EPSILON {
        return None;
    }
    let qp = (c.x - a.x, c.y - a.y);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denom;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Cuts open polylines against closed clip rings, keeping the spans whose
/// midpoints are inside (or outside) the clip under even-odd fill.
/// Contiguous surviving spans are stitched back into polylines.
fn clip_open_paths(subj: &Pathset, clip: &Pathset, keep_inside: bool) -> Pathset {
    let mut out: Pathset = Vec::new();
    for path in subj {
        let mut current: Path = Vec::new();
        for window in path.windows(2) {
            let (a, b) = (window[0], window[1]);
            let mut params = vec![0.0, 1.0];
            for ring in clip {
                let n = ring.len();
                if n < 2 {
                    continue;
                }
                for i in 0..n {
                    let c = ring[i];
                    let d = ring[(i + 1) % n];
                    if let Some(t) = crossing_param(a, b, c, d) {
                        params.push(t);
                    }
                }
            }
            params.sort_by(f64::total_cmp);
            params.dedup_by(|x, y| (*x - *y).abs() < SPAN_EPSILON);
            for pair in params.windows(2) {
                let (t0, t1) = (pair[0], pair[1]);
                if t1 - t0 < SPAN_EPSILON {
                    continue;
                }
                let at = |t: f64| Point2::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y));
                let mid = at((t0 + t1) / 2.0);
                if point_in_paths(&mid, clip) != keep_inside {
                    continue;
                }
                let (start, end) = (at(t0), at(t1));
                match current.last() {
                    Some(last) if last.distance_to(&start) < 1e-6 => current.push(end),
                    _ => {
                        if current.len() > 1 {
                            out.push(std::mem::take(&mut current));
                        }
                        current = vec![start, end];
                    }
                }
            }
        }
        if current.len() > 1 {
            out.push(current);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geom_types::path_area;

    fn square(minx: f64, miny: f64, size: f64) -> Path {
        vec![
            Point2::new(minx, miny),
            Point2::new(minx + size, miny),
            Point2::new(minx + size, miny + size),
            Point2::new(minx, miny + size),
        ]
    }

    fn total_area(paths: &Pathset) -> f64 {
        paths.iter().map(|p| path_area(p)).sum()
    }

    #[test]
    fn union_with_empty_is_identity() {
        let a = vec![square(0.0, 0.0, 10.0)];
        assert_eq!(union(&a, &Vec::new()), a);
        assert_eq!(union(&Vec::new(), &a), a);
        assert!(difference(&Vec::new(), &a, true).is_empty());
        assert_eq!(difference(&a, &Vec::new(), true), a);
        assert!(intersection(&a, &Vec::new(), true).is_empty());
    }

    #[test]
    fn union_of_disjoint_squares_keeps_both() {
        let a = vec![square(0.0, 0.0, 10.0)];
        let b = vec![square(20.0, 0.0, 10.0)];
        let out = union(&a, &b);
        assert_eq!(out.len(), 2);
        assert!((total_area(&out).abs() - 200.0).abs() < 0.1);
    }

    #[test]
    fn union_is_associative_up_to_area() {
        let a = vec![square(0.0, 0.0, 10.0)];
        let b = vec![square(5.0, 0.0, 10.0)];
        let c = vec![square(10.0, 0.0, 10.0)];
        let left = union(&union(&a, &b), &c);
        let right = union(&a, &union(&b, &c));
        assert!((total_area(&left) - total_area(&right)).abs() < 0.1);
        assert!((total_area(&left).abs() - 200.0).abs() < 0.1);
    }

    #[test]
    fn difference_with_self_is_empty() {
        let a = vec![square(0.0, 0.0, 10.0)];
        let out = difference(&a, &a, true);
        assert!((total_area(&out)).abs() < 0.1);
    }

    #[test]
    fn intersection_of_overlap() {
        let a = vec![square(0.0, 0.0, 10.0)];
        let b = vec![square(5.0, 5.0, 10.0)];
        let out = intersection(&a, &b, true);
        assert!((total_area(&out).abs() - 25.0).abs() < 0.1);
    }

    #[test]
    fn offset_grows_and_shrinks() {
        let a = vec![square(0.0, 0.0, 10.0)];
        let grown = offset(&a, 1.0, JoinStyle::Miter);
        let shrunk = offset(&a, -1.0, JoinStyle::Square);
        assert!((total_area(&grown).abs() - 144.0).abs() < 1.0);
        assert!((total_area(&shrunk).abs() - 64.0).abs() < 0.5);
        assert!(offset(&Vec::new(), 1.0, JoinStyle::Square).is_empty());
    }

    #[test]
    fn orient_paths_outer_ccw_hole_cw() {
        let outer: Path = square(0.0, 0.0, 10.0).into_iter().rev().collect();
        let hole = square(3.0, 3.0, 4.0);
        let oriented = orient_paths(&vec![outer, hole]);
        assert!(path_area(&oriented[0]) > 0.0);
        assert!(path_area(&oriented[1]) < 0.0);
        // Idempotent.
        let again = orient_paths(&oriented);
        assert_eq!(again, oriented);
    }

    #[test]
    fn open_clip_keeps_interior_spans() {
        let clip = vec![square(0.0, 0.0, 10.0)];
        let line: Path = vec![Point2::new(-5.0, 5.0), Point2::new(15.0, 5.0)];
        let inside = intersection(&vec![line.clone()], &clip, false);
        assert_eq!(inside.len(), 1);
        assert!((inside[0][0].x - 0.0).abs() < 1e-6);
        assert!((inside[0].last().unwrap().x - 10.0).abs() < 1e-6);

        let outside = difference(&vec![line], &clip, false);
        assert_eq!(outside.len(), 2);
    }

    #[test]
    fn open_clip_against_holes() {
        // Square with a centered hole: the crossing line loses its middle.
        let clip = vec![square(0.0, 0.0, 10.0), square(4.0, 4.0, 2.0)];
        let line: Path = vec![Point2::new(-1.0, 5.0), Point2::new(11.0, 5.0)];
        let inside = intersection(&vec![line], &clip, false);
        assert_eq!(inside.len(), 2);
        let kept: f64 = inside
            .iter()
            .map(|p| p.first().unwrap().distance_to(p.last().unwrap()))
            .sum();
        assert!((kept - 8.0).abs() < 1e-6);
    }

    #[test]
    fn open_clip_stitches_polylines() {
        // A zigzag fully inside the clip survives as one polyline.
        let clip = vec![square(0.0, 0.0, 10.0)];
        let zig: Path = vec![
            Point2::new(1.0, 1.0),
            Point2::new(9.0, 2.0),
            Point2::new(1.0, 3.0),
            Point2::new(9.0, 4.0),
        ];
        let out = intersection(&vec![zig.clone()], &clip, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), zig.len());
    }
}
