//! Infill pattern generation.
//!
//! Patterns are produced as families of long line segments (or zigzag
//! columns for hexagons) covering the bounding rectangle of a layer; the
//! fill stage clips them to the actual infill mask. Line families are
//! anchored to a spacing-aligned grid around the bounds center so the
//! pattern stays phase-aligned from layer to layer.

use geom_types::{Bounds2, Path, Pathset, Point2};

/// The sparse infill pattern presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfillPattern {
    Lines,
    Triangles,
    Grid,
    Hexagons,
}

impl InfillPattern {
    /// Parses the configuration value; unknown strings fall back to Lines.
    pub fn from_config(name: &str) -> InfillPattern {
        match name {
            "Triangles" => InfillPattern::Triangles,
            "Grid" => InfillPattern::Grid,
            "Hexagons" => InfillPattern::Hexagons,
            _ => InfillPattern::Lines,
        }
    }
}

/// One family of parallel lines per rotation in `rots`, spaced `spacing`
/// apart, long enough to cover `rect` at any angle.
pub fn make_infill_pat(rect: Bounds2, base_ang: f64, spacing: f64, rots: &[f64]) -> Pathset {
    let (minx, miny, maxx, maxy) = rect;
    let w = maxx - minx;
    let h = maxy - miny;
    let cx = ((maxx + minx) / 2.0 / spacing).floor() * spacing;
    let cy = ((maxy + miny) / 2.0 / spacing).floor() * spacing;
    let r = w.hypot(h) / std::f64::consts::SQRT_2;
    let n = (r / spacing).ceil() as i64;
    let mut out = Vec::new();
    for rot in rots {
        let along = (base_ang + rot).to_radians();
        let across = (base_ang + rot + 90.0).to_radians();
        let (c1, s1) = (along.cos(), along.sin());
        let (c2, s2) = (across.cos() * spacing, across.sin() * spacing);
        for i in (1 - n)..n {
            let cp = (cx + c2 * i as f64, cy + s2 * i as f64);
            out.push(vec![
                Point2::new(cp.0 + r * c1, cp.1 + r * s1),
                Point2::new(cp.0 - r * c1, cp.1 - r * s1),
            ]);
        }
    }
    out
}

fn clamp_density(density: f64) -> Option<f64> {
    if density <= 0.0 {
        None
    } else {
        Some(density.min(1.0))
    }
}

/// Straight lines at `base_ang`, spacing `ewidth / density`.
pub fn make_infill_lines(rect: Bounds2, base_ang: f64, density: f64, ewidth: f64) -> Pathset {
    match clamp_density(density) {
        Some(density) => make_infill_pat(rect, base_ang, ewidth / density, &[0.0]),
        None => Vec::new(),
    }
}

/// Two crossed line families at 0 and 90 degrees from `base_ang`.
pub fn make_infill_grid(rect: Bounds2, base_ang: f64, density: f64, ewidth: f64) -> Pathset {
    match clamp_density(density) {
        Some(density) => make_infill_pat(rect, base_ang, 2.0 * ewidth / density, &[0.0, 90.0]),
        None => Vec::new(),
    }
}

/// Three line families at 0, 60, and 120 degrees from `base_ang`.
pub fn make_infill_triangles(rect: Bounds2, base_ang: f64, density: f64, ewidth: f64) -> Pathset {
    match clamp_density(density) {
        Some(density) => {
            make_infill_pat(rect, base_ang, 3.0 * ewidth / density, &[0.0, 60.0, 120.0])
        }
        None => Vec::new(),
    }
}

/// Hexagonal ribbons: continuous four-point zigzag columns, alternating
/// columns mirrored, generated about the bounds center and rotated around
/// it.
pub fn make_infill_hexagons(rect: Bounds2, base_ang: f64, density: f64, ewidth: f64) -> Pathset {
    let Some(density) = clamp_density(density) else {
        return Vec::new();
    };
    let (minx, miny, maxx, maxy) = rect;
    let sin60 = (60.0f64).to_radians().sin();
    let ext = 0.5 * ewidth / (60.0f64).to_radians().tan();
    let aspect = 3.0 / sin60;
    let col_spacing = ewidth * 4.0 / 3.0 / density;
    let row_spacing = col_spacing * aspect;
    let w = maxx - minx;
    let h = maxy - miny;
    let cx = (maxx + minx) / 2.0;
    let cy = (maxy + miny) / 2.0;
    let r = w.max(h) * std::f64::consts::SQRT_2;
    let n_col = (r / col_spacing).ceil() as i64;
    let n_row = (r / row_spacing).ceil() as i64;
    let (s, c) = base_ang.to_radians().sin_cos();
    let mut out = Vec::new();
    for col in -n_col..n_col {
        let mut path: Path = Vec::new();
        let base_x = col as f64 * col_spacing;
        for row in -n_row..n_row {
            let base_y = row as f64 * row_spacing;
            let mut x1 = base_x + ewidth / 2.0;
            let mut x2 = base_x + col_spacing - ewidth / 2.0;
            if col.rem_euclid(2) != 0 {
                std::mem::swap(&mut x1, &mut x2);
            }
            path.push(Point2::new(x1, base_y + ext));
            path.push(Point2::new(x2, base_y + row_spacing / 6.0 - ext));
            path.push(Point2::new(x2, base_y + row_spacing / 2.0 + ext));
            path.push(Point2::new(x1, base_y + row_spacing * 2.0 / 3.0 - ext));
        }
        out.push(
            path.into_iter()
                .map(|p| Point2::new(cx + p.x * c - p.y * s, cy + p.x * s + p.y * c))
                .collect(),
        );
    }
    out
}
