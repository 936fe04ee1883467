//! Planar geometry shared by hit boxes, the spatial hash and collision queries.
//!
//! Conventions: world space is y-up, angles are degrees with counter-clockwise
//! positive, and polygons are closed (the last point connects back to the first).
//! Overlap tests are strict: shapes that only share an edge or a corner do not
//! overlap.

use glam::Vec2;

/// Axis-aligned bounding box in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Tight box around `points`, or `None` for an empty slice.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Strict overlap: a shared edge (zero-area intersection) is not an overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    /// Inclusive containment; points on the boundary are inside.
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Rotate `point` around the origin by `angle_deg` (counter-clockwise positive).
pub fn rotate_point(point: Vec2, angle_deg: f32) -> Vec2 {
    if angle_deg == 0.0 {
        return point;
    }
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    Vec2::new(point.x * cos - point.y * sin, point.x * sin + point.y * cos)
}

/// Scale, then rotate, then translate each point. This is the order sprites
/// apply their transform to a texture's hit box.
pub fn transform_points(points: &[Vec2], position: Vec2, scale: Vec2, angle_deg: f32) -> Vec<Vec2> {
    points
        .iter()
        .map(|p| rotate_point(*p * scale, angle_deg) + position)
        .collect()
}

/// Signed area (shoelace). Positive for counter-clockwise winding
/// in y-up space.
pub fn signed_area(polygon: &[Vec2]) -> f32 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// Even-odd ray casting. Works for concave polygons.
pub fn is_point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = polygon[i];
        let pj = polygon[j];
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn project(polygon: &[Vec2], axis: Vec2) -> (f32, f32) {
    polygon.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), p| {
        let d = p.dot(axis);
        (min.min(d), max.max(d))
    })
}

/// Separating-axis test over the edge normals of both polygons.
///
/// Separation is strict (`max_a <= min_b`), so polygons that only touch do not
/// intersect. The set of axes does not depend on argument order, which keeps the
/// predicate symmetric. Concave polygons are tested through their projections.
pub fn are_polygons_intersecting(a: &[Vec2], b: &[Vec2]) -> bool {
    if a.len() < 3 || b.len() < 3 {
        return false;
    }
    for polygon in [a, b] {
        for i in 0..polygon.len() {
            let edge = polygon[(i + 1) % polygon.len()] - polygon[i];
            if edge == Vec2::ZERO {
                continue;
            }
            let axis = Vec2::new(-edge.y, edge.x);
            let (min_a, max_a) = project(a, axis);
            let (min_b, max_b) = project(b, axis);
            if max_a <= min_b || max_b <= min_a {
                return false;
            }
        }
    }
    true
}

fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Ramer–Douglas–Peucker on an open polyline; endpoints are always kept.
pub fn simplify_polyline(points: &[Vec2], tolerance: f32) -> Vec<Vec2> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (mut far_index, mut far_dist) = (start, 0.0f32);
        for (i, p) in points.iter().enumerate().take(end).skip(start + 1) {
            let d = distance_to_segment(*p, points[start], points[end]);
            if d > far_dist {
                far_index = i;
                far_dist = d;
            }
        }
        if far_dist > tolerance {
            keep[far_index] = true;
            stack.push((start, far_index));
            stack.push((far_index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// RDP on a closed ring. The ring is split at its first point and the point
/// farthest from it so both halves keep a stable anchor.
pub fn simplify_closed(points: &[Vec2], tolerance: f32) -> Vec<Vec2> {
    if points.len() <= 3 || tolerance <= 0.0 {
        return points.to_vec();
    }
    let origin = points[0];
    let far = points
        .iter()
        .enumerate()
        .fold((0usize, 0.0f32), |(best, best_d), (i, p)| {
            let d = p.distance_squared(origin);
            if d > best_d {
                (i, d)
            } else {
                (best, best_d)
            }
        })
        .0;
    if far == 0 {
        return vec![origin];
    }

    let mut first = simplify_polyline(&points[..=far], tolerance);
    let mut tail: Vec<Vec2> = points[far..].to_vec();
    tail.push(origin);
    let mut second = simplify_polyline(&tail, tolerance);

    first.pop();
    second.pop();
    first.extend(second);
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(center: Vec2, size: f32) -> Vec<Vec2> {
        let h = size * 0.5;
        vec![
            center + Vec2::new(-h, -h),
            center + Vec2::new(h, -h),
            center + Vec2::new(h, h),
            center + Vec2::new(-h, h),
        ]
    }

    #[test]
    fn aabb_shared_edge_is_not_overlap() {
        let a = Aabb::from_center_size(Vec2::ZERO, Vec2::splat(10.0));
        let b = Aabb::from_center_size(Vec2::new(10.0, 0.0), Vec2::splat(10.0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        let c = Aabb::from_center_size(Vec2::new(9.0, 0.0), Vec2::splat(10.0));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn aabb_from_points_is_tight() {
        let bb = Aabb::from_points(&[Vec2::new(1.0, -2.0), Vec2::new(-3.0, 4.0)]).unwrap();
        assert_eq!(bb.min, Vec2::new(-3.0, -2.0));
        assert_eq!(bb.max, Vec2::new(1.0, 4.0));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn rotate_quarter_turn_is_counter_clockwise() {
        let p = rotate_point(Vec2::new(1.0, 0.0), 90.0);
        assert!((p - Vec2::new(0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn transform_scales_before_rotating() {
        let pts = transform_points(&[Vec2::new(1.0, 0.0)], Vec2::new(10.0, 0.0), Vec2::new(2.0, 1.0), 90.0);
        assert!((pts[0] - Vec2::new(10.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn signed_area_positive_for_ccw() {
        let sq = square(Vec2::ZERO, 2.0);
        assert!((signed_area(&sq) - 4.0).abs() < 1e-6);
        let rev: Vec<Vec2> = sq.into_iter().rev().collect();
        assert!(signed_area(&rev) < 0.0);
    }

    #[test]
    fn point_in_concave_polygon() {
        // U shape opening upward.
        let u = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(3.0, 0.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(2.0, 3.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 3.0),
            Vec2::new(0.0, 3.0),
        ];
        assert!(is_point_in_polygon(Vec2::new(0.5, 2.0), &u));
        assert!(!is_point_in_polygon(Vec2::new(1.5, 2.0), &u));
        assert!(is_point_in_polygon(Vec2::new(1.5, 0.5), &u));
        assert!(!is_point_in_polygon(Vec2::new(5.0, 0.5), &u));
    }

    #[test]
    fn sat_touching_squares_do_not_intersect() {
        let a = square(Vec2::ZERO, 10.0);
        let b = square(Vec2::new(10.0, 0.0), 10.0);
        assert!(!are_polygons_intersecting(&a, &b));
        let c = square(Vec2::new(9.0, 0.0), 10.0);
        assert!(are_polygons_intersecting(&a, &c));
        assert!(are_polygons_intersecting(&c, &a));
    }

    #[test]
    fn sat_rotated_square_near_corner() {
        // Diamond whose tip stops just short of the square's corner region.
        let a = square(Vec2::ZERO, 2.0);
        let diamond: Vec<Vec2> = transform_points(&square(Vec2::ZERO, 2.0), Vec2::new(2.5, 2.5), Vec2::ONE, 45.0);
        assert!(!are_polygons_intersecting(&a, &diamond));
    }

    #[test]
    fn sat_degenerate_input_never_intersects() {
        let a = square(Vec2::ZERO, 2.0);
        assert!(!are_polygons_intersecting(&a, &[Vec2::ZERO, Vec2::ONE]));
    }

    #[test]
    fn simplify_polyline_drops_collinear_points() {
        let line: Vec<Vec2> = (0..10).map(|i| Vec2::new(i as f32, 0.0)).collect();
        let out = simplify_polyline(&line, 0.1);
        assert_eq!(out, vec![Vec2::new(0.0, 0.0), Vec2::new(9.0, 0.0)]);
    }

    #[test]
    fn simplify_closed_keeps_square_corners() {
        let mut ring = Vec::new();
        for i in 0..4 {
            ring.push(Vec2::new(i as f32, 0.0));
        }
        for i in 0..4 {
            ring.push(Vec2::new(4.0, i as f32));
        }
        for i in 0..4 {
            ring.push(Vec2::new(4.0 - i as f32, 4.0));
        }
        for i in 0..4 {
            ring.push(Vec2::new(0.0, 4.0 - i as f32));
        }
        let out = simplify_closed(&ring, 0.5);
        assert_eq!(out.len(), 4);
        for corner in [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(0.0, 4.0),
        ] {
            assert!(out.contains(&corner), "missing corner {corner:?}");
        }
    }
}
