//! Insertion-deduplicating mesh caches.
//!
//! The mesh stores points, edges, and triangles in three arena vectors.
//! Cross-references are typed indices into those arenas, never pointers, so
//! the vertex/edge/triangle graph stays cycle-free and a coordinate
//! mutation is a linear scan plus a key-map rebuild.
//!
//! Each cache deduplicates on a key derived from quantized coordinates
//! (four decimal places). Re-inserting an existing record bumps its
//! reference count; the counts are what manifold validation reads: every
//! triangle should be unique, and every edge should be shared by exactly
//! two triangles.

use std::collections::HashMap;

use geom_types::{triangle, Point3, PointKey, Vector3};

macro_rules! arena_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn idx(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_index!(
    /// Index of a point in the [`PointCache`] arena.
    PointIndex
);
arena_index!(
    /// Index of an edge in the [`EdgeCache`] arena.
    EdgeIndex
);
arena_index!(
    /// Index of a triangle in the [`TriangleCache`] arena.
    TriangleIndex
);

/// Axis-aligned bounding box over all cached points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub minx: f64,
    pub miny: f64,
    pub minz: f64,
    pub maxx: f64,
    pub maxy: f64,
    pub maxz: f64,
}

impl Aabb {
    fn of_points(points: &[Point3]) -> Option<Aabb> {
        let first = points.first()?;
        let mut bb = Aabb {
            minx: first.x,
            miny: first.y,
            minz: first.z,
            maxx: first.x,
            maxy: first.y,
            maxz: first.z,
        };
        for p in &points[1..] {
            bb.minx = bb.minx.min(p.x);
            bb.miny = bb.miny.min(p.y);
            bb.minz = bb.minz.min(p.z);
            bb.maxx = bb.maxx.max(p.x);
            bb.maxy = bb.maxy.max(p.y);
            bb.maxz = bb.maxz.max(p.z);
        }
        Some(bb)
    }

    pub fn size(&self) -> (f64, f64, f64) {
        (
            self.maxx - self.minx,
            self.maxy - self.miny,
            self.maxz - self.minz,
        )
    }

    pub fn center(&self) -> (f64, f64, f64) {
        (
            (self.minx + self.maxx) / 2.0,
            (self.miny + self.maxy) / 2.0,
            (self.minz + self.maxz) / 2.0,
        )
    }
}

/// Canonical unordered pair of point keys, ordered Z-major like the points
/// themselves.
fn canon_key_pair(a: PointKey, b: PointKey) -> (PointKey, PointKey) {
    let rev = |k: PointKey| [k[2], k[1], k[0]];
    if rev(a) <= rev(b) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Deduplicating point store with a running bounding box.
#[derive(Debug, Default, Clone)]
pub struct PointCache {
    points: Vec<Point3>,
    index: HashMap<PointKey, PointIndex>,
    bounds: Option<Aabb>,
}

impl PointCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the index of the point at these coordinates, inserting it if
    /// it is new. Identity is the 4-decimal quantized key.
    pub fn add(&mut self, x: f64, y: f64, z: f64) -> PointIndex {
        let pt = Point3::new(x, y, z);
        if let Some(&existing) = self.index.get(&pt.key()) {
            return existing;
        }
        let idx = PointIndex(self.points.len() as u32);
        self.index.insert(pt.key(), idx);
        self.points.push(pt);
        let bb = self.bounds.get_or_insert(Aabb {
            minx: x,
            miny: y,
            minz: z,
            maxx: x,
            maxy: y,
            maxz: z,
        });
        bb.minx = bb.minx.min(x);
        bb.miny = bb.miny.min(y);
        bb.minz = bb.minz.min(z);
        bb.maxx = bb.maxx.max(x);
        bb.maxy = bb.maxy.max(y);
        bb.maxz = bb.maxz.max(z);
        idx
    }

    pub fn point(&self, idx: PointIndex) -> Point3 {
        self.points[idx.idx()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point3> {
        self.points.iter()
    }

    /// The bounding box over all points; zero-extent at the origin when the
    /// cache is empty.
    pub fn bounds(&self) -> Aabb {
        self.bounds.unwrap_or_default()
    }

    /// Rebuilds the key map from current coordinates.
    pub fn rehash(&mut self) {
        self.index.clear();
        for (i, pt) in self.points.iter().enumerate() {
            self.index.entry(pt.key()).or_insert(PointIndex(i as u32));
        }
    }

    pub fn translate(&mut self, offset: &Vector3) {
        for pt in &mut self.points {
            pt.translate(offset);
        }
        self.bounds = Aabb::of_points(&self.points);
        self.rehash();
    }

    pub fn scale(&mut self, sx: f64, sy: f64, sz: f64) {
        for pt in &mut self.points {
            pt.scale(sx, sy, sz);
        }
        self.bounds = Aabb::of_points(&self.points);
        self.rehash();
    }
}

/// A mesh edge: two point indices plus the number of triangles that
/// re-inserted it.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub p1: PointIndex,
    pub p2: PointIndex,
    pub count: u32,
}

/// Deduplicating edge store with an endpoint reverse index.
#[derive(Debug, Default, Clone)]
pub struct EdgeCache {
    edges: Vec<Edge>,
    index: HashMap<(PointKey, PointKey), EdgeIndex>,
    endpoints: HashMap<PointKey, Vec<EdgeIndex>>,
}

impl EdgeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn key_of(points: &PointCache, p1: PointIndex, p2: PointIndex) -> (PointKey, PointKey) {
        canon_key_pair(points.point(p1).key(), points.point(p2).key())
    }

    /// Returns the edge between the two points, inserting it if new and
    /// bumping its refcount otherwise.
    pub fn add(&mut self, points: &PointCache, p1: PointIndex, p2: PointIndex) -> EdgeIndex {
        let key = Self::key_of(points, p1, p2);
        if let Some(&existing) = self.index.get(&key) {
            self.edges[existing.idx()].count += 1;
            return existing;
        }
        let idx = EdgeIndex(self.edges.len() as u32);
        // Store endpoints in canonical order.
        let (p1, p2) = if points.point(p1).key() == key.0 { (p1, p2) } else { (p2, p1) };
        self.edges.push(Edge { p1, p2, count: 1 });
        self.index.insert(key, idx);
        self.endpoints.entry(key.0).or_default().push(idx);
        self.endpoints.entry(key.1).or_default().push(idx);
        idx
    }

    pub fn edge(&self, idx: EdgeIndex) -> &Edge {
        &self.edges[idx.idx()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeIndex, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeIndex(i as u32), e))
    }

    /// Edges with an endpoint at the given point.
    pub fn edges_at(&self, points: &PointCache, p: PointIndex) -> &[EdgeIndex] {
        self.endpoints
            .get(&points.point(p).key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rebuilds both key maps from current point coordinates.
    pub fn rehash(&mut self, points: &PointCache) {
        self.index.clear();
        self.endpoints.clear();
        for (i, edge) in self.edges.iter().enumerate() {
            let idx = EdgeIndex(i as u32);
            let key = Self::key_of(points, edge.p1, edge.p2);
            self.index.entry(key).or_insert(idx);
            self.endpoints.entry(key.0).or_default().push(idx);
            self.endpoints.entry(key.1).or_default().push(idx);
        }
    }
}

/// A mesh triangle: three point indices in canonical counter-clockwise
/// order, the unit outward normal, and a duplicate-insert count.
#[derive(Debug, Clone, Copy)]
pub struct MeshTriangle {
    pub verts: [PointIndex; 3],
    pub norm: Vector3,
    pub count: u32,
}

/// Deduplicating triangle store with vertex and edge reverse indices.
#[derive(Debug, Default, Clone)]
pub struct TriangleCache {
    triangles: Vec<MeshTriangle>,
    index: HashMap<[PointKey; 3], TriangleIndex>,
    vertex_index: HashMap<PointKey, Vec<TriangleIndex>>,
    edge_index: HashMap<(PointKey, PointKey), Vec<TriangleIndex>>,
}

impl TriangleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Inserts a triangle, canonicalizing vertex order and normal first:
    /// the reversed-lex smallest vertex leads, and the cyclic order is
    /// counter-clockwise seen from the outward normal (recomputed when the
    /// provided normal is zero-length). Coincident triangles only bump the
    /// refcount.
    pub fn add(
        &mut self,
        points: &PointCache,
        verts: [PointIndex; 3],
        norm: Vector3,
    ) -> TriangleIndex {
        let mut verts = verts;
        let mut coords = verts.map(|v| points.point(v));
        for _ in 0..2 {
            if coords[0].rev_cmp(&coords[1]).is_gt() || coords[0].rev_cmp(&coords[2]).is_gt() {
                verts.rotate_left(1);
                coords.rotate_left(1);
            }
        }
        let mut norm = norm;
        if norm.length() > 0.0 {
            if triangle::is_clockwise(&coords, &norm) {
                verts.swap(1, 2);
                coords.swap(1, 2);
            }
        } else {
            triangle::fixup_normal(&mut coords, &mut norm);
        }

        let key = coords.map(|c| c.key());
        if let Some(&existing) = self.index.get(&key) {
            self.triangles[existing.idx()].count += 1;
            return existing;
        }
        let idx = TriangleIndex(self.triangles.len() as u32);
        self.triangles.push(MeshTriangle { verts, norm, count: 1 });
        self.index.insert(key, idx);
        self.link(key, idx);
        idx
    }

    fn link(&mut self, key: [PointKey; 3], idx: TriangleIndex) {
        for i in 0..3 {
            self.vertex_index.entry(key[i]).or_default().push(idx);
            let pair = canon_key_pair(key[i], key[(i + 1) % 3]);
            self.edge_index.entry(pair).or_default().push(idx);
        }
    }

    pub fn triangle(&self, idx: TriangleIndex) -> &MeshTriangle {
        &self.triangles[idx.idx()]
    }

    /// The resolved vertex coordinates of a triangle.
    pub fn coords(&self, points: &PointCache, idx: TriangleIndex) -> [Point3; 3] {
        self.triangles[idx.idx()].verts.map(|v| points.point(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TriangleIndex, &MeshTriangle)> {
        self.triangles
            .iter()
            .enumerate()
            .map(|(i, t)| (TriangleIndex(i as u32), t))
    }

    /// Triangles touching the given vertex.
    pub fn vertex_triangles(&self, points: &PointCache, p: PointIndex) -> &[TriangleIndex] {
        self.vertex_index
            .get(&points.point(p).key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Triangles sharing the given edge.
    pub fn edge_triangles(
        &self,
        points: &PointCache,
        p1: PointIndex,
        p2: PointIndex,
    ) -> &[TriangleIndex] {
        let pair = canon_key_pair(points.point(p1).key(), points.point(p2).key());
        self.edge_index.get(&pair).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indices ordered by the per-axis sorted-coordinate comparison
    /// (Z-major), for deterministic mesh output.
    pub fn sorted_indices(&self, points: &PointCache) -> Vec<TriangleIndex> {
        let sort_key = |idx: &TriangleIndex| -> [[f64; 3]; 3] {
            let coords = self.coords(points, *idx);
            let mut axes = [[0.0; 3]; 3];
            for axis in 0..3 {
                let mut vals = [
                    [coords[0].x, coords[0].y, coords[0].z][axis],
                    [coords[1].x, coords[1].y, coords[1].z][axis],
                    [coords[2].x, coords[2].y, coords[2].z][axis],
                ];
                vals.sort_by(f64::total_cmp);
                axes[axis] = vals;
            }
            axes
        };
        let mut indices: Vec<TriangleIndex> =
            (0..self.triangles.len() as u32).map(TriangleIndex).collect();
        indices.sort_by(|a, b| {
            let (ka, kb) = (sort_key(a), sort_key(b));
            for axis in (0..3).rev() {
                for i in 0..3 {
                    let ord = ka[axis][i].total_cmp(&kb[axis][i]);
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
            }
            std::cmp::Ordering::Equal
        });
        indices
    }

    /// Rebuilds every key map from current point coordinates. The stored
    /// vertex order is kept as-is.
    pub fn rehash(&mut self, points: &PointCache) {
        self.index.clear();
        self.vertex_index.clear();
        self.edge_index.clear();
        let keys: Vec<[PointKey; 3]> = self
            .triangles
            .iter()
            .map(|t| t.verts.map(|v| points.point(v).key()))
            .collect();
        for (i, key) in keys.into_iter().enumerate() {
            let idx = TriangleIndex(i as u32);
            self.index.entry(key).or_insert(idx);
            self.link(key, idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_cache_deduplicates_on_quantized_key() {
        let mut cache = PointCache::new();
        let a = cache.add(1.0, 2.0, 3.0);
        let b = cache.add(1.00001, 2.0, 3.0);
        let c = cache.add(1.001, 2.0, 3.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.len(), 2);

        let bb = cache.bounds();
        assert_eq!(bb.minx, 1.0);
        assert_eq!(bb.maxx, 1.001);
        assert_eq!(bb.maxz, 3.0);
    }

    #[test]
    fn point_cache_translate_updates_bounds_and_keys() {
        let mut cache = PointCache::new();
        cache.add(0.0, 0.0, 0.0);
        cache.add(10.0, 0.0, 0.0);
        cache.translate(&Vector3::new(5.0, 1.0, -2.0));
        let bb = cache.bounds();
        assert_eq!(bb.minx, 5.0);
        assert_eq!(bb.maxx, 15.0);
        assert_eq!(bb.minz, -2.0);
        // A lookup at the new location must find the moved point.
        let again = cache.add(5.0, 1.0, -2.0);
        assert_eq!(again, PointIndex(0));
    }

    #[test]
    fn edge_cache_counts_shared_edges() {
        let mut points = PointCache::new();
        let a = points.add(0.0, 0.0, 0.0);
        let b = points.add(1.0, 0.0, 0.0);
        let mut edges = EdgeCache::new();
        let e1 = edges.add(&points, a, b);
        // Same edge, opposite direction: refcount bumps instead of insert.
        let e2 = edges.add(&points, b, a);
        assert_eq!(e1, e2);
        assert_eq!(edges.edge(e1).count, 2);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges.edges_at(&points, a), &[e1]);
    }

    #[test]
    fn triangle_cache_canonicalizes_and_counts() {
        let mut points = PointCache::new();
        let a = points.add(0.0, 0.0, 0.0);
        let b = points.add(1.0, 0.0, 0.0);
        let c = points.add(0.0, 1.0, 0.0);
        let mut tris = TriangleCache::new();
        let up = Vector3::new(0.0, 0.0, 1.0);
        let t1 = tris.add(&points, [b, c, a], up);
        let t2 = tris.add(&points, [a, b, c], up);
        assert_eq!(t1, t2);
        assert_eq!(tris.triangle(t1).count, 2);
        // Canonical rotation starts at the reversed-lex smallest vertex.
        assert_eq!(tris.triangle(t1).verts[0], a);
        assert_eq!(tris.vertex_triangles(&points, a), &[t1]);
        assert_eq!(tris.edge_triangles(&points, a, b), &[t1]);
    }

    #[test]
    fn triangle_cache_flips_clockwise_windings() {
        let mut points = PointCache::new();
        let a = points.add(0.0, 0.0, 0.0);
        let b = points.add(1.0, 0.0, 0.0);
        let c = points.add(0.0, 1.0, 0.0);
        let mut tris = TriangleCache::new();
        let up = Vector3::new(0.0, 0.0, 1.0);
        // Clockwise as seen from +Z: must be flipped on insert.
        let t = tris.add(&points, [a, c, b], up);
        let coords = tris.coords(&points, t);
        assert!(!triangle::is_clockwise(&coords, &up));
    }

    #[test]
    fn rehash_after_scale_finds_new_keys() {
        let mut points = PointCache::new();
        let a = points.add(1.0, 1.0, 1.0);
        let b = points.add(2.0, 1.0, 1.0);
        let c = points.add(1.0, 2.0, 1.0);
        let mut edges = EdgeCache::new();
        edges.add(&points, a, b);
        let mut tris = TriangleCache::new();
        tris.add(&points, [a, b, c], Vector3::new(0.0, 0.0, 1.0));

        points.scale(2.0, 2.0, 2.0);
        edges.rehash(&points);
        tris.rehash(&points);

        assert_eq!(points.add(2.0, 2.0, 2.0), a);
        assert_eq!(edges.edges_at(&points, a).len(), 1);
        assert_eq!(tris.vertex_triangles(&points, a).len(), 1);
    }
}
