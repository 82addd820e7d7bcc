//! The triangle mesh model.
//!
//! A [`Mesh`] owns the three deduplicating caches plus a layer index that
//! maps layer numbers to the triangles crossing them. It is populated by a
//! format reader, optionally centered/translated/scaled (each mutation
//! rehashes the caches, because cache keys derive from rounded
//! coordinates), layer-indexed once the layer height is known, and then
//! sliced repeatedly.

use std::collections::{BTreeMap, HashMap};

use geom_types::{quant3, triangle, Path, Point2, Point3, Vector3};
use tracing::{debug, warn};

use super::cache::{EdgeCache, EdgeIndex, PointCache, TriangleCache, TriangleIndex};

/// Z quantum applied to vertices on load so slicing planes (snapped to
/// quantum centers) never pass exactly through a vertex.
pub const Z_QUANTUM: f64 = 1e-3;

/// An indexed triangle mesh with manifold-validation scratch state.
#[derive(Debug, Default, Clone)]
pub struct Mesh {
    pub points: PointCache,
    pub edges: EdgeCache,
    pub triangles: TriangleCache,
    /// Layer number -> triangles crossing that layer; built by
    /// [`Mesh::assign_layers`].
    layer_index: HashMap<i64, Vec<TriangleIndex>>,
    /// Discrepancies found by the last [`Mesh::check_manifold`] run.
    pub dupe_triangles: Vec<TriangleIndex>,
    pub hole_edges: Vec<EdgeIndex>,
    pub excess_edges: Vec<EdgeIndex>,
    /// Source file name, used in diagnostics.
    pub name: String,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Inserts one triangle, quantizing vertex Z coordinates and rejecting
    /// degenerate faces (coincident vertices or a near-zero edge angle).
    /// Returns the triangle index, or `None` for a rejected face.
    pub fn add_triangle(
        &mut self,
        verts: [[f64; 3]; 3],
        norm: Vector3,
        quantum: f64,
    ) -> Option<TriangleIndex> {
        let mut verts = verts;
        if quantum > 0.0 {
            for v in &mut verts {
                v[2] = (v[2] / quantum + 0.5).floor() * quantum;
            }
            let keys = verts.map(|v| Point3::new(v[0], v[1], v[2]).key());
            if keys[0] == keys[1] || keys[1] == keys[2] || keys[2] == keys[0] {
                return None;
            }
            let p = verts.map(|v| Point3::new(v[0], v[1], v[2]));
            let vec1 = p[0] - p[1];
            let vec2 = p[2] - p[1];
            if vec1.angle(&vec2) < 1e-8 {
                return None;
            }
        }
        let v1 = self.points.add(verts[0][0], verts[0][1], verts[0][2]);
        let v2 = self.points.add(verts[1][0], verts[1][1], verts[1][2]);
        let v3 = self.points.add(verts[2][0], verts[2][1], verts[2][2]);
        self.edges.add(&self.points, v1, v2);
        self.edges.add(&self.points, v2, v3);
        self.edges.add(&self.points, v3, v1);
        Some(self.triangles.add(&self.points, [v1, v2, v3], norm))
    }

    /// Validates that the surface is closed and free of non-manifold
    /// junctions. Populates the discrepancy lists and returns true when all
    /// three are empty.
    pub fn check_manifold(&mut self) -> bool {
        self.dupe_triangles = self
            .triangles
            .iter()
            .filter(|(_, t)| t.count != 1)
            .map(|(idx, _)| idx)
            .collect();
        self.hole_edges = self
            .edges
            .iter()
            .filter(|(_, e)| e.count == 1)
            .map(|(idx, _)| idx)
            .collect();
        self.excess_edges = self
            .edges
            .iter()
            .filter(|(_, e)| e.count > 2)
            .map(|(idx, _)| idx)
            .collect();

        for idx in &self.dupe_triangles {
            let coords = self.triangles.coords(&self.points, *idx);
            warn!(
                "NON-MANIFOLD DUPLICATE FACE! {}: [{}, {}, {}]",
                self.name, coords[0], coords[1], coords[2]
            );
        }
        for idx in &self.hole_edges {
            let edge = self.edges.edge(*idx);
            warn!(
                "NON-MANIFOLD HOLE EDGE! {}: [{} - {}]",
                self.name,
                self.points.point(edge.p1),
                self.points.point(edge.p2)
            );
        }
        for idx in &self.excess_edges {
            let edge = self.edges.edge(*idx);
            warn!(
                "NON-MANIFOLD DUPLICATE EDGE! {}: [{} - {}]",
                self.name,
                self.points.point(edge.p1),
                self.points.point(edge.p2)
            );
        }
        self.dupe_triangles.is_empty() && self.hole_edges.is_empty() && self.excess_edges.is_empty()
    }

    /// Translates every vertex and rebuilds all cache keys.
    pub fn translate(&mut self, offset: &Vector3) {
        self.points.translate(offset);
        self.edges.rehash(&self.points);
        self.triangles.rehash(&self.points);
    }

    /// Scales every vertex about the origin and rebuilds all cache keys.
    pub fn scale(&mut self, sx: f64, sy: f64, sz: f64) {
        self.points.scale(sx, sy, sz);
        self.edges.rehash(&self.points);
        self.triangles.rehash(&self.points);
    }

    /// Moves the bounding-box center to the given point.
    pub fn center(&mut self, cp: (f64, f64, f64)) {
        let (cx, cy, cz) = self.points.bounds().center();
        self.translate(&Vector3::new(cp.0 - cx, cp.1 - cy, cp.2 - cz));
    }

    /// Drops the model onto the Z=0 plane.
    pub fn relevel(&mut self) {
        let minz = self.points.bounds().minz;
        if minz != 0.0 {
            self.translate(&Vector3::new(0.0, 0.0, -minz));
        }
    }

    /// Indexes which triangles cross which layer for the given layer
    /// height.
    pub fn assign_layers(&mut self, layer_height: f64) {
        self.layer_index.clear();
        for (idx, _) in self.triangles.iter() {
            let coords = self.triangles.coords(&self.points, idx);
            let (minz, maxz) = triangle::z_range(&coords);
            let minl = (minz / layer_height + 0.01).floor() as i64;
            let maxl = (maxz / layer_height - 0.01).ceil() as i64;
            for layer in minl..=maxl {
                self.layer_index.entry(layer).or_default().push(idx);
            }
        }
        debug!("layer index spans {} layers", self.layer_index.len());
    }

    /// Triangles crossing the given layer number.
    pub fn layer_triangles(&self, layer: i64) -> &[TriangleIndex] {
        self.layer_index
            .get(&layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cross-sections the mesh at `z`, chaining per-triangle segments into
    /// closed outlines. Returns `(outpaths, deadpaths)`: the closed paths
    /// and any chains that could not be closed (open shells or non-manifold
    /// geometry).
    pub fn slice_at_z(&self, z: f64, layer_height: f64) -> (Vec<Path>, Vec<Path>) {
        let key_of = |pt: &Point2| (quant3(pt.x), quant3(pt.y));

        let layer = (z / layer_height + 0.5).floor() as i64;
        let mut pending: BTreeMap<(i64, i64), Vec<Path>> = BTreeMap::new();
        for idx in self.layer_triangles(layer) {
            let coords = self.triangles.coords(&self.points, *idx);
            let norm = self.triangles.triangle(*idx).norm;
            let Some((a, b)) = triangle::slice_at_z(&coords, &norm, z, Z_QUANTUM) else {
                continue;
            };
            let key1 = key_of(&a);
            let key2 = key_of(&b);
            // A segment whose reverse would just re-trace the chain already
            // ending at our start point is redundant boundary; skip it.
            if let Some(found) = pending.get(&key2) {
                if found
                    .last()
                    .and_then(|path| path.last())
                    .is_some_and(|end| key_of(end) == key1)
                {
                    continue;
                }
            }
            pending.entry(key1).or_default().push(vec![a, b]);
        }

        let mut outpaths = Vec::new();
        let mut deadpaths = Vec::new();
        let take_first = |pending: &mut BTreeMap<(i64, i64), Vec<Path>>, key: &(i64, i64)| {
            let list = pending.get_mut(key)?;
            let path = if list.is_empty() { None } else { Some(list.remove(0)) };
            if list.is_empty() {
                pending.remove(key);
            }
            path
        };

        while let Some(start_key) = pending.keys().next().copied() {
            let Some(mut path) = take_first(&mut pending, &start_key) else {
                continue;
            };
            loop {
                let key1 = path.first().map(key_of);
                let key2 = path.last().map(key_of);
                let (Some(key1), Some(key2)) = (key1, key2) else {
                    break;
                };
                if key1 == key2 {
                    outpaths.push(path);
                    break;
                }
                if let Some(cont) = take_first(&mut pending, &key2) {
                    path.extend_from_slice(&cont[1..]);
                } else if let Some(cont) = take_first(&mut pending, &key1) {
                    let mut rev: Path = cont.into_iter().rev().collect();
                    rev.extend_from_slice(&path[1..]);
                    path = rev;
                } else {
                    deadpaths.push(path);
                    break;
                }
            }
        }

        if !deadpaths.is_empty() {
            warn!("incomplete polygon at z={}", z);
        }
        (outpaths, deadpaths)
    }
}

#[cfg(test)]
pub(crate) mod test_meshes {
    use super::*;

    /// An axis-aligned solid box from `min` to `max`, two triangles per
    /// face with outward normals.
    pub fn boxed(min: [f64; 3], max: [f64; 3]) -> Mesh {
        let mut mesh = Mesh::new();
        add_box(&mut mesh, min, max);
        mesh
    }

    /// Adds the twelve triangles of an axis-aligned box to an existing
    /// mesh.
    pub fn add_box(mesh: &mut Mesh, min: [f64; 3], max: [f64; 3]) {
        let [x0, y0, z0] = min;
        let [x1, y1, z1] = max;
        let quads: [([f64; 3], [[f64; 3]; 4]); 6] = [
            // -Z face (looking from below, counter-clockwise).
            ([0.0, 0.0, -1.0], [[x0, y0, z0], [x0, y1, z0], [x1, y1, z0], [x1, y0, z0]]),
            // +Z face.
            ([0.0, 0.0, 1.0], [[x0, y0, z1], [x1, y0, z1], [x1, y1, z1], [x0, y1, z1]]),
            // -Y face.
            ([0.0, -1.0, 0.0], [[x0, y0, z0], [x1, y0, z0], [x1, y0, z1], [x0, y0, z1]]),
            // +Y face.
            ([0.0, 1.0, 0.0], [[x1, y1, z0], [x0, y1, z0], [x0, y1, z1], [x1, y1, z1]]),
            // -X face.
            ([-1.0, 0.0, 0.0], [[x0, y1, z0], [x0, y0, z0], [x0, y0, z1], [x0, y1, z1]]),
            // +X face.
            ([1.0, 0.0, 0.0], [[x1, y0, z0], [x1, y1, z0], [x1, y1, z1], [x1, y0, z1]]),
        ];
        for (norm, quad) in quads {
            let norm = Vector3::new(norm[0], norm[1], norm[2]);
            mesh.add_triangle([quad[0], quad[1], quad[2]], norm, Z_QUANTUM);
            mesh.add_triangle([quad[0], quad[2], quad[3]], norm, Z_QUANTUM);
        }
    }

    /// A tetrahedron with a square-triangle base at z=0 and an apex above.
    pub fn tetra(size: f64, height: f64) -> Mesh {
        let mut mesh = Mesh::new();
        let a = [0.0, 0.0, 0.0];
        let b = [size, 0.0, 0.0];
        let c = [0.0, size, 0.0];
        let apex = [size / 4.0, size / 4.0, height];
        // Normals left zero: recomputed from vertex winding.
        for verts in [[a, c, b], [a, b, apex], [b, c, apex], [c, a, apex]] {
            mesh.add_triangle(verts, Vector3::ZERO, Z_QUANTUM);
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::test_meshes::{boxed, tetra};
    use super::*;
    use geom_types::path_area;

    #[test]
    fn closed_box_is_manifold() {
        let mut mesh = boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.edges.len(), 18);
        assert!(mesh.check_manifold());
        for (_, edge) in mesh.edges.iter() {
            assert_eq!(edge.count, 2);
        }
    }

    #[test]
    fn missing_face_reports_hole_edges() {
        let mut mesh = boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        // Rebuild without one top triangle.
        let mut holed = Mesh::new();
        for (i, (idx, _)) in mesh.triangles.iter().enumerate() {
            if i == 3 {
                continue;
            }
            let coords = mesh.triangles.coords(&mesh.points, idx);
            let norm = mesh.triangles.triangle(idx).norm;
            holed.add_triangle(
                [
                    [coords[0].x, coords[0].y, coords[0].z],
                    [coords[1].x, coords[1].y, coords[1].z],
                    [coords[2].x, coords[2].y, coords[2].z],
                ],
                norm,
                Z_QUANTUM,
            );
        }
        assert!(!holed.check_manifold());
        assert_eq!(holed.hole_edges.len(), 3);
        assert!(holed.dupe_triangles.is_empty());
        assert!(mesh.check_manifold());
    }

    #[test]
    fn duplicate_triangle_detected() {
        let mut mesh = boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        mesh.add_triangle(
            [[0.0, 0.0, 0.0], [0.0, 10.0, 0.0], [10.0, 10.0, 0.0]],
            Vector3::new(0.0, 0.0, -1.0),
            Z_QUANTUM,
        );
        assert!(!mesh.check_manifold());
        assert_eq!(mesh.dupe_triangles.len(), 1);
    }

    #[test]
    fn degenerate_triangles_are_rejected() {
        let mut mesh = Mesh::new();
        // Coincident vertices.
        assert!(mesh
            .add_triangle(
                [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
                Vector3::ZERO,
                Z_QUANTUM,
            )
            .is_none());
        // Collinear vertices.
        assert!(mesh
            .add_triangle(
                [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
                Vector3::ZERO,
                Z_QUANTUM,
            )
            .is_none());
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn slice_box_yields_one_closed_square() {
        let mut mesh = boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        mesh.assign_layers(0.2);
        let (outpaths, deadpaths) = mesh.slice_at_z(5.1, 0.2);
        assert!(deadpaths.is_empty());
        assert_eq!(outpaths.len(), 1);
        let path = &outpaths[0];
        assert_eq!(path.first(), path.last());
        // Closed square of side 10, traced counter-clockwise.
        assert!((path_area(path).abs() - 100.0).abs() < 1e-6);
        assert!(path_area(path) > 0.0);
    }

    #[test]
    fn every_interior_layer_closes() {
        let mut mesh = tetra(20.0, 10.0);
        let h = 0.5;
        mesh.assign_layers(h);
        let layers = (10.0 / h) as i64;
        let mut last_area = f64::INFINITY;
        for layer in 0..layers {
            let z = h * (layer as f64 + 1.0) - h / 2.0;
            let (outpaths, deadpaths) = mesh.slice_at_z(z, h);
            assert!(deadpaths.is_empty(), "dead paths at z={}", z);
            assert_eq!(outpaths.len(), 1, "expected one outline at z={}", z);
            let area = path_area(&outpaths[0]).abs();
            assert!(area < last_area, "areas should shrink towards the apex");
            last_area = area;
        }
    }

    #[test]
    fn center_and_relevel_move_bounds() {
        let mut mesh = boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        mesh.center((100.0, 100.0, 5.0));
        let bb = mesh.points.bounds();
        assert!((bb.minx - 95.0).abs() < 1e-9);
        assert!((bb.maxx - 105.0).abs() < 1e-9);
        assert!((bb.minz - 0.0).abs() < 1e-9);
        mesh.translate(&Vector3::new(0.0, 0.0, 3.0));
        mesh.relevel();
        assert!((mesh.points.bounds().minz - 0.0).abs() < 1e-9);
    }

    #[test]
    fn scale_stretches_bounds() {
        let mut mesh = boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        mesh.scale(2.0, 1.0, 0.5);
        let (w, d, h) = mesh.points.bounds().size();
        assert!((w - 20.0).abs() < 1e-9);
        assert!((d - 10.0).abs() < 1e-9);
        assert!((h - 5.0).abs() < 1e-9);
        assert!(mesh.check_manifold());
    }

    #[test]
    fn layer_index_covers_triangle_spans() {
        let mut mesh = boxed([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        mesh.assign_layers(0.2);
        // A mid-height layer only crosses the four walls (8 triangles).
        assert_eq!(mesh.layer_triangles(25).len(), 8);
        assert!(mesh.layer_triangles(9999).is_empty());
    }
}
