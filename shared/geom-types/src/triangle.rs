//! Triangle canonicalization and planar cross-sectioning.
//!
//! A mesh triangle is stored as three vertices plus a unit outward normal.
//! The vertex triple is rotated so the reversed-lexicographic smallest
//! vertex comes first, and the cyclic order is counter-clockwise as seen
//! from outside (the normal direction). Cross-sectioning a triangle with a
//! horizontal plane yields a directed 2D segment oriented so that the
//! outward normal's XY projection lies on its right: walking the segment
//! keeps solid on the left, which makes assembled outer outlines
//! counter-clockwise.

use crate::path2d::{path_area, Path, Point2};
use crate::point::Point3;
use crate::vector::Vector3;

/// Rotates the vertex triple so the reversed-lexicographic smallest vertex
/// is first. Cyclic order is preserved.
pub fn canonical_rotation(verts: [Point3; 3]) -> [Point3; 3] {
    let mut verts = verts;
    for _ in 0..2 {
        if verts[0].rev_cmp(&verts[1]).is_gt() || verts[0].rev_cmp(&verts[2]).is_gt() {
            verts.rotate_left(1);
        }
    }
    verts
}

/// True when the vertices wind clockwise as seen from the normal direction.
pub fn is_clockwise(verts: &[Point3; 3], norm: &Vector3) -> bool {
    let v1 = verts[1] - verts[0];
    let v2 = verts[2] - verts[0];
    norm.dot(&v1.cross(&v2)) < 0.0
}

/// Enforces the triangle invariants: with a non-zero normal the vertices
/// are flipped if needed to be counter-clockwise seen from outside; with a
/// zero normal the outward normal is recomputed from the vertex order.
pub fn fixup_normal(verts: &mut [Point3; 3], norm: &mut Vector3) {
    if norm.length() > 0.0 {
        if is_clockwise(verts, norm) {
            verts.swap(1, 2);
        }
    } else {
        let v1 = verts[1] - verts[0];
        let v2 = verts[2] - verts[0];
        let n = v1.cross(&v2);
        if n.length() > 1e-6 {
            *norm = n.normalized();
        }
    }
}

/// The (min, max) Z extent of the triangle.
pub fn z_range(verts: &[Point3; 3]) -> (f64, f64) {
    let mut minz = verts[0].z;
    let mut maxz = verts[0].z;
    for v in &verts[1..] {
        minz = minz.min(v.z);
        maxz = maxz.max(v.z);
    }
    (minz, maxz)
}

/// Angle of the face below the horizon, in degrees: 90 for a face pointing
/// straight down, 0 for a vertical wall, negative for upward faces.
pub fn overhang_angle(norm: &Vector3) -> f64 {
    let down = Vector3::new(0.0, 0.0, -1.0);
    90.0 - down.angle(norm).to_degrees()
}

/// Orients segment `a -> b` so the reference point lies on its right.
fn orient_by_reference(a: Point2, b: Point2, reference: Point2) -> (Point2, Point2) {
    let side = (b.x - a.x) * (reference.y - a.y) - (b.y - a.y) * (reference.x - a.x);
    if side > 0.0 {
        (b, a)
    } else {
        (a, b)
    }
}

/// Where edge `v1 -> v2` crosses the plane at `z`. The endpoints are put
/// in canonical order first so the two triangles sharing an edge compute
/// the bit-identical crossing point; layer assembly keys depend on that.
fn edge_crossing(v1: &Point3, v2: &Point3, z: f64) -> Point2 {
    let (p, q) = if v1.rev_cmp(v2).is_le() { (v1, v2) } else { (v2, v1) };
    let u = (z - p.z) / (q.z - p.z);
    Point2::new(p.x + u * (q.x - p.x), p.y + u * (q.y - p.y))
}

/// Cross-sections the triangle with the plane at `z`, returning a directed
/// 2D segment, or `None` when the plane misses the triangle, the triangle
/// is horizontal, or the plane passes exactly through its top or bottom
/// vertex.
///
/// The incoming `z` is snapped to the center of its quantum bin
/// (`floor(z/q + 0.5)*q + q/2`), which keeps slicing planes off vertex Z
/// coordinates once mesh Z values have been quantized on load.
pub fn slice_at_z(
    verts: &[Point3; 3],
    norm: &Vector3,
    z: f64,
    quantum: f64,
) -> Option<(Point2, Point2)> {
    let z = (z / quantum + 0.5).floor() * quantum + quantum / 2.0;
    let (minz, maxz) = z_range(verts);
    if z < minz || z > maxz {
        return None;
    }
    if norm.x.hypot(norm.y) < 1e-6 {
        // Horizontal faces contribute boundary, not cross-section.
        return None;
    }
    let norm2d = Vector3::new(norm.x, norm.y, 0.0);

    // A whole edge lying on the plane.
    for i in 0..3 {
        let v1 = &verts[i];
        let v2 = &verts[(i + 1) % 3];
        if v1.z == z && v2.z == z {
            let a = Point2::new(v1.x, v1.y);
            let b = Point2::new(v2.x, v2.y);
            let reference = Point2::new(v1.x + norm2d.x, v1.y + norm2d.y);
            return Some(orient_by_reference(a, b, reference));
        }
    }
    if z == minz || z == maxz {
        return None;
    }

    // A single vertex on the plane; the segment runs from it to the point
    // where the opposite edge crosses.
    for i in 0..3 {
        let v1 = &verts[i];
        let v2 = &verts[(i + 1) % 3];
        let v3 = &verts[(i + 2) % 3];
        if v2.z == z {
            let a = Point2::new(v2.x, v2.y);
            let b = edge_crossing(v1, v3, z);
            let reference = Point2::new(v2.x + norm2d.x, v2.y + norm2d.y);
            return Some(orient_by_reference(a, b, reference));
        }
    }

    // Generic case: exactly two edges straddle the plane.
    let mut crossings = [Point2::default(); 2];
    let mut found = 0;
    for i in 0..3 {
        let v1 = &verts[i];
        let v2 = &verts[(i + 1) % 3];
        if v1.z == v2.z {
            continue;
        }
        let u = (z - v1.z) / (v2.z - v1.z);
        if (0.0..=1.0).contains(&u) && found < 2 {
            crossings[found] = edge_crossing(v1, v2, z);
            found += 1;
        }
    }
    if found < 2 {
        return None;
    }
    let reference = Point2::new(crossings[0].x + norm2d.x, crossings[0].y + norm2d.y);
    Some(orient_by_reference(crossings[0], crossings[1], reference))
}

fn z_intercept(p1: &Point3, p2: &Point3, z: f64) -> Option<Point2> {
    if (p1.z > z && p2.z > z) || (p1.z < z && p2.z < z) || (p1.z == z && p2.z == z) {
        return None;
    }
    let u = (z - p1.z) / (p2.z - p1.z);
    Some(Point2::new(p1.x + u * (p2.x - p1.x), p1.y + u * (p2.y - p1.y)))
}

/// The XY projection of the triangle, limited to its portion at or above
/// `z` when one is given. Returns a clockwise path, or `None` when the
/// footprint is empty or degenerate.
pub fn footprint(verts: &[Point3; 3], z: Option<f64>) -> Option<Path> {
    let mut path: Path = Vec::new();
    match z {
        None => {
            for v in verts {
                path.push(Point2::new(v.x, v.y));
            }
        }
        Some(z) => {
            for i in 0..3 {
                let v1 = &verts[i];
                let v2 = &verts[(i + 1) % 3];
                if v1.z > z {
                    path.push(Point2::new(v1.x, v1.y));
                }
                if (v1.z > z && v2.z < z) || (v1.z < z && v2.z > z) {
                    if let Some(icept) = z_intercept(v1, v2, z) {
                        path.push(icept);
                    }
                }
            }
        }
    }
    if path.is_empty() {
        return None;
    }
    let area = path_area(&path);
    if area == 0.0 {
        return None;
    }
    if area > 0.0 {
        path.reverse();
    }
    Some(path)
}
