//! 2D paths and pathsets.
//!
//! A [`Path`] is an ordered point sequence; it is closed when its first and
//! last points coincide. A [`Pathset`] is a list of paths read as a polygon
//! with holes under the even-odd fill rule. These helpers are engine-free:
//! containment, area, and bounds are computed here so that orientation
//! decisions never depend on the boolean engine's conventions.

use serde::{Deserialize, Serialize};

/// A 2D point in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Point2 { x, y }
    }
}

impl From<Point2> for (f64, f64) {
    fn from(p: Point2) -> (f64, f64) {
        (p.x, p.y)
    }
}

/// An ordered sequence of 2D points.
pub type Path = Vec<Point2>;

/// A set of paths forming a polygon with holes under even-odd fill.
pub type Pathset = Vec<Path>;

/// Axis-aligned bounds of a pathset: (minx, miny, maxx, maxy).
pub type Bounds2 = (f64, f64, f64, f64);

/// Appends the first point to the path if it is not already closed.
pub fn close_path(path: &Path) -> Path {
    match (path.first(), path.last()) {
        (Some(first), Some(last)) if first != last => {
            let mut out = path.clone();
            out.push(*first);
            out
        }
        _ => path.clone(),
    }
}

/// Closes every path in the set. Idempotent.
pub fn close_paths(paths: &Pathset) -> Pathset {
    paths.iter().map(close_path).collect()
}

/// Bounding box over every point of every path; (0, 0, 0, 0) when empty.
pub fn paths_bounds(paths: &Pathset) -> Bounds2 {
    let mut bounds: Option<Bounds2> = None;
    for path in paths {
        for pt in path {
            bounds = Some(match bounds {
                None => (pt.x, pt.y, pt.x, pt.y),
                Some((minx, miny, maxx, maxy)) => (
                    minx.min(pt.x),
                    miny.min(pt.y),
                    maxx.max(pt.x),
                    maxy.max(pt.y),
                ),
            });
        }
    }
    bounds.unwrap_or((0.0, 0.0, 0.0, 0.0))
}

/// Signed shoelace area. Positive for counter-clockwise winding. A trailing
/// closing point is ignored.
pub fn path_area(path: &Path) -> f64 {
    let pts: &[Point2] = match (path.first(), path.last()) {
        (Some(first), Some(last)) if path.len() > 1 && first == last => &path[..path.len() - 1],
        _ => path,
    };
    if pts.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, p1) in pts.iter().enumerate() {
        let p2 = &pts[(i + 1) % pts.len()];
        sum += p1.x * p2.y - p2.x * p1.y;
    }
    sum / 2.0
}

pub fn path_is_ccw(path: &Path) -> bool {
    path_area(path) >= 0.0
}

/// Total polyline length of a path.
pub fn path_length(path: &Path) -> f64 {
    path.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

/// Even-odd ray cast against a single ring (treated as closed).
pub fn point_in_path(pt: &Point2, path: &Path) -> bool {
    let n = path.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (&path[i], &path[j]);
        if (pi.y > pt.y) != (pj.y > pt.y) {
            let x_cross = pj.x + (pt.y - pj.y) / (pi.y - pj.y) * (pi.x - pj.x);
            if pt.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Even-odd containment against a pathset: the point is inside when an odd
/// number of rings contain it.
pub fn point_in_paths(pt: &Point2, paths: &Pathset) -> bool {
    let mut count = 0u32;
    for path in paths {
        if point_in_path(pt, path) {
            count += 1;
        }
    }
    count % 2 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Path {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ]
    }

    #[test]
    fn close_is_idempotent() {
        let open = square(2.0);
        let once = close_paths(&vec![open]);
        let twice = close_paths(&once);
        assert_eq!(once, twice);
        assert_eq!(once[0].len(), 5);
        assert_eq!(once[0][0], once[0][4]);
    }

    #[test]
    fn area_sign_follows_winding() {
        let ccw = square(2.0);
        let cw: Path = ccw.iter().rev().cloned().collect();
        assert!((path_area(&ccw) - 4.0).abs() < 1e-12);
        assert!((path_area(&cw) + 4.0).abs() < 1e-12);
        assert!(path_is_ccw(&ccw));
        assert!(!path_is_ccw(&cw));
        // Closing the path must not change the area.
        assert!((path_area(&close_path(&ccw)) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_cover_all_paths() {
        let paths = vec![square(2.0), vec![Point2::new(-1.0, 5.0)]];
        assert_eq!(paths_bounds(&paths), (-1.0, 0.0, 2.0, 5.0));
        assert_eq!(paths_bounds(&Vec::new()), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn even_odd_containment() {
        // Outer square with a hole; a point in the hole is outside.
        let outer = square(10.0);
        let hole = vec![
            Point2::new(3.0, 3.0),
            Point2::new(7.0, 3.0),
            Point2::new(7.0, 7.0),
            Point2::new(3.0, 7.0),
        ];
        let set = vec![outer, hole];
        assert!(point_in_paths(&Point2::new(1.0, 1.0), &set));
        assert!(!point_in_paths(&Point2::new(5.0, 5.0), &set));
        assert!(!point_in_paths(&Point2::new(11.0, 5.0), &set));
    }
}
