//! The GEOMETRY Engine - 2D polygon primitives for plane boundaries
//!
//! Plane boundaries are 2D polygons in a plane's local (x, z) frame. This module provides:
//! - Convex hulls via Andrew's monotone chain (clockwise output)
//! - Coplanarity of two oriented poses
//! - Overlap of two convex hulls placed at world-space centres
//! - Triangle/triangle overlap (separating edge test)

use crate::error::GeometryError;
use crate::types::{PlanePoint, PlaneVector};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Default tolerance on local-Y difference for two poses to count as one plane.
pub const DEFAULT_COPLANAR_EPSILON: f64 = 0.1;

/// X-distance under which two points sort as one column (then by y).
const HULL_COLUMN_TOLERANCE: f64 = 1e-5;

/// Segments whose direction determinant falls below this count as parallel.
const PARALLEL_TOLERANCE: f64 = 1e-4;

// ============================================================================
// CONVEX HULL
// ============================================================================

/// Angle of a point around the origin, measured from +Y towards +X.
///
/// This is `atan2(x, y)`, not the usual `atan2(y, x)`. Sorting by it gives
/// the clockwise pre-order the hull scan has always started from.
#[inline]
fn clockwise_angle(p: &PlanePoint) -> f64 {
    p.x.atan2(p.y)
}

/// Orders points clockwise around the origin (angle from +Y).
pub fn order_clockwise(points: &mut [PlanePoint]) {
    points.sort_by(|a, b| clockwise_angle(a).total_cmp(&clockwise_angle(b)));
}

/// Sorts by x, treating runs of x values closer than the column tolerance
/// as a single column ordered by y.
fn sort_by_columns(points: &mut [PlanePoint]) {
    points.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut start = 0;
    for i in 1..=points.len() {
        let column_ends =
            i == points.len() || (points[i].x - points[i - 1].x).abs() >= HULL_COLUMN_TOLERANCE;
        if column_ends {
            points[start..i].sort_by(|a, b| a.y.total_cmp(&b.y));
            start = i;
        }
    }
}

/// Z component of (a - o) × (b - o). Positive for a counter-clockwise turn.
#[inline]
pub fn cross(o: &PlanePoint, a: &PlanePoint, b: &PlanePoint) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Computes the convex hull of `points` with the monotone chain algorithm.
///
/// Inputs of 0 or 1 points are returned unchanged. Unless `is_sorted` is set,
/// points are first put into clockwise pre-order (see [`order_clockwise`]).
/// Collinear points are dropped (`cross <= 0` pops). The result is clockwise and
/// does not repeat the first point.
///
/// Degenerate input (duplicates, all collinear) yields a hull of 2 points; callers
/// that need a boundary must check for `len() >= 3` themselves.
pub fn convex_hull(points: &[PlanePoint], is_sorted: bool) -> Vec<PlanePoint> {
    if points.len() <= 1 {
        return points.to_vec();
    }

    let mut sorted = points.to_vec();
    if !is_sorted {
        order_clockwise(&mut sorted);
    }
    sort_by_columns(&mut sorted);

    let mut hull: Vec<PlanePoint> = Vec::with_capacity(2 * sorted.len());

    // Lower chain
    for p in &sorted {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(*p);
    }

    // Upper chain (never pops into the lower one)
    let lower_len = hull.len() + 1;
    for p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(*p);
    }

    // Last point closes the loop onto the first one
    hull.pop();
    hull.reverse();
    hull
}

// ============================================================================
// COPLANARITY
// ============================================================================

/// True if two poses sit at the same height along their own up axes.
///
/// Each position is rotated into its own orientation's frame (`inverse(rot) * pos`)
/// and the local Y coordinates are compared against `eps`.
pub fn is_on_one_plane(
    pos_a: &Vector3<f64>,
    rot_a: &UnitQuaternion<f64>,
    pos_b: &Vector3<f64>,
    rot_b: &UnitQuaternion<f64>,
    eps: f64,
) -> bool {
    let local_a = rot_a.inverse() * pos_a;
    let local_b = rot_b.inverse() * pos_b;
    (local_a.y - local_b.y).abs() < eps
}

// ============================================================================
// OVERLAP
// ============================================================================

/// Parametric segment test for `p1→p2` against `p3→p4`.
///
/// Near-parallel segments (|det| < 1e-4) never intersect, collinear overlap included.
/// Touching endpoints count as an intersection.
pub fn segments_intersect(
    p1: &PlanePoint,
    p2: &PlanePoint,
    p3: &PlanePoint,
    p4: &PlanePoint,
) -> bool {
    let a = *p2 - *p1;
    let b = *p3 - *p4;
    let c = *p1 - *p3;

    let alpha_numerator = b.y * c.x - b.x * c.y;
    let beta_numerator = a.x * c.y - a.y * c.x;
    let denominator = a.y * b.x - a.x * b.y;

    if denominator.abs() < PARALLEL_TOLERANCE {
        return false;
    }

    if denominator > 0.0 {
        !(alpha_numerator < 0.0
            || alpha_numerator > denominator
            || beta_numerator < 0.0
            || beta_numerator > denominator)
    } else {
        !(alpha_numerator > 0.0
            || alpha_numerator < denominator
            || beta_numerator > 0.0
            || beta_numerator < denominator)
    }
}

/// True if any edge of hull A (offset by `center_a`) crosses any edge of hull B
/// (offset by `center_b`).
///
/// Passing the very same hull slice twice short-circuits to `true`. Equal point lists
/// stored separately go through the edge test, so two identical rectangles far apart
/// do not overlap. A hull lying entirely inside the other has no crossing edges and
/// reports `false`.
pub fn is_convex_hull_overlapping(
    center_a: &PlaneVector,
    hull_a: &[PlanePoint],
    center_b: &PlaneVector,
    hull_b: &[PlanePoint],
) -> bool {
    if std::ptr::eq(hull_a, hull_b) {
        return true;
    }

    for i in 0..hull_a.len() {
        let a0 = hull_a[i] + *center_a;
        let a1 = hull_a[(i + 1) % hull_a.len()] + *center_a;

        for j in 0..hull_b.len() {
            let b0 = hull_b[j] + *center_b;
            let b1 = hull_b[(j + 1) % hull_b.len()] + *center_b;
            if segments_intersect(&a0, &a1, &b0, &b1) {
                return true;
            }
        }
    }

    false
}

// ============================================================================
// TRIANGLES
// ============================================================================

/// A 2D triangle. Overlap tests expect counter-clockwise winding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub p1: PlanePoint,
    pub p2: PlanePoint,
    pub p3: PlanePoint,
}

impl Triangle {
    pub fn new(p1: PlanePoint, p2: PlanePoint, p3: PlanePoint) -> Self {
        Self { p1, p2, p3 }
    }

    pub fn from_points(points: [PlanePoint; 3]) -> Self {
        Self::new(points[0], points[1], points[2])
    }

    /// Vertex by index (0..3).
    pub fn point(&self, index: usize) -> Option<PlanePoint> {
        match index {
            0 => Some(self.p1),
            1 => Some(self.p2),
            2 => Some(self.p3),
            _ => None,
        }
    }

    /// Twice the signed area. Positive when wound counter-clockwise.
    pub fn det2d(&self) -> f64 {
        self.p1.x * (self.p2.y - self.p3.y)
            + self.p2.x * (self.p3.y - self.p1.y)
            + self.p3.x * (self.p1.y - self.p2.y)
    }

    pub fn reverse_winding(&mut self) {
        std::mem::swap(&mut self.p2, &mut self.p3);
    }

    /// Returns this triangle wound counter-clockwise.
    ///
    /// A clockwise triangle is flipped when `allow_reversed`, rejected otherwise.
    pub fn with_ccw_winding(mut self, allow_reversed: bool) -> Result<Self, GeometryError> {
        if self.det2d() < 0.0 {
            if !allow_reversed {
                return Err(GeometryError::WrongWinding);
            }
            self.reverse_winding();
        }
        Ok(self)
    }

    /// Outside test where points on the boundary still collide.
    fn boundary_collide_check(&self, eps: f64) -> bool {
        self.det2d() < eps
    }

    /// Outside test where points on the boundary do not collide.
    fn boundary_doesnt_collide_check(&self, eps: f64) -> bool {
        self.det2d() <= eps
    }
}

/// True if every vertex of `other` lies outside the directed edge `from → to`.
fn all_outside_edge(
    from: PlanePoint,
    to: PlanePoint,
    other: &[PlanePoint; 3],
    eps: f64,
    on_boundary: bool,
) -> bool {
    other.iter().all(|p| {
        let probe = Triangle::new(from, to, *p);
        if on_boundary {
            probe.boundary_collide_check(eps)
        } else {
            probe.boundary_doesnt_collide_check(eps)
        }
    })
}

/// Tests whether two triangles overlap.
///
/// For every edge of either triangle, if all three vertices of the other triangle
/// lie on its outer side the triangles are separated. `on_boundary` decides whether
/// touching (shared edges or vertices) counts as overlap.
///
/// Both triangles must be counter-clockwise; with `allow_reversed` clockwise input
/// is flipped first, otherwise it is rejected with [`GeometryError::WrongWinding`].
pub fn triangle_overlap(
    t1: &Triangle,
    t2: &Triangle,
    eps: f64,
    allow_reversed: bool,
    on_boundary: bool,
) -> Result<bool, GeometryError> {
    let t1 = t1.with_ccw_winding(allow_reversed)?;
    let t2 = t2.with_ccw_winding(allow_reversed)?;

    let lp1 = [t1.p1, t1.p2, t1.p3];
    let lp2 = [t2.p1, t2.p2, t2.p3];

    for (edges, others) in [(&lp1, &lp2), (&lp2, &lp1)] {
        for i in 0..3 {
            let j = (i + 1) % 3;
            if all_outside_edge(edges[i], edges[j], others, eps, on_boundary) {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    fn pt(x: f64, y: f64) -> PlanePoint {
        PlanePoint::new(x, y)
    }

    fn unit_square() -> Vec<PlanePoint> {
        vec![pt(-1.0, -1.0), pt(1.0, -1.0), pt(1.0, 1.0), pt(-1.0, 1.0)]
    }

    fn sorted(mut points: Vec<PlanePoint>) -> Vec<PlanePoint> {
        points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        points
    }

    /// Signed area of a closed polygon (negative for clockwise).
    fn signed_area(poly: &[PlanePoint]) -> f64 {
        let mut area = 0.0;
        for i in 0..poly.len() {
            let a = poly[i];
            let b = poly[(i + 1) % poly.len()];
            area += a.x * b.y - b.x * a.y;
        }
        area * 0.5
    }

    #[test]
    fn test_hull_trivial_inputs_unchanged() {
        assert!(convex_hull(&[], false).is_empty());
        let single = vec![pt(3.0, 4.0)];
        assert_eq!(convex_hull(&single, false), single);
    }

    #[test]
    fn test_hull_drops_interior_and_collinear_points() {
        let mut points = unit_square();
        points.push(pt(0.0, 0.0)); // interior
        points.push(pt(0.2, -0.3)); // interior
        points.push(pt(0.0, 1.0)); // on an edge
        points.push(pt(1.0, 0.5)); // on an edge

        let hull = convex_hull(&points, false);
        assert_eq!(sorted(hull), sorted(unit_square()));
    }

    #[test]
    fn test_hull_is_clockwise() {
        let points = vec![pt(0.0, 0.0), pt(2.0, 0.0), pt(2.0, 1.0), pt(0.0, 1.0), pt(1.0, 0.5)];
        let hull = convex_hull(&points, false);
        assert_eq!(hull.len(), 4);
        assert!(signed_area(&hull) < 0.0, "hull should be clockwise: {:?}", hull);
    }

    #[test]
    fn test_hull_collinear_input_is_degenerate() {
        let points = vec![pt(0.0, 0.0), pt(1.0, 1.0), pt(2.0, 2.0), pt(3.0, 3.0)];
        let hull = convex_hull(&points, false);
        assert_eq!(hull.len(), 2);
        assert_eq!(sorted(hull), vec![pt(0.0, 0.0), pt(3.0, 3.0)]);
    }

    #[test]
    fn test_hull_column_tolerance_orders_by_y() {
        // x values within 1e-5 behave like a single column
        let points = vec![pt(0.0, 1.0), pt(0.000_001, -1.0), pt(2.0, 0.0)];
        let hull = convex_hull(&points, true);
        assert_eq!(hull.len(), 3);
    }

    #[test]
    fn test_order_clockwise_uses_angle_from_up() {
        let mut points = vec![pt(-1.0, 0.0), pt(1.0, 0.0), pt(0.0, 1.0), pt(0.0, -1.0)];
        order_clockwise(&mut points);
        // atan2(x, y): left = -π/2, up = 0, right = π/2, down = π
        assert_eq!(points, vec![pt(-1.0, 0.0), pt(0.0, 1.0), pt(1.0, 0.0), pt(0.0, -1.0)]);
    }

    #[test]
    fn test_is_on_one_plane() {
        let identity = UnitQuaternion::identity();
        let a = Vector3::new(0.0, 1.0, 0.0);
        let b = Vector3::new(5.0, 1.05, -3.0);
        let c = Vector3::new(0.0, 1.5, 0.0);

        assert!(is_on_one_plane(&a, &identity, &b, &identity, DEFAULT_COPLANAR_EPSILON));
        assert!(!is_on_one_plane(&a, &identity, &c, &identity, DEFAULT_COPLANAR_EPSILON));
    }

    #[test]
    fn test_is_on_one_plane_uses_own_orientation() {
        // Rotated 90° about Z, the local Y axis points along world -X.
        let wall = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let a = Vector3::new(2.0, 0.0, 0.0);
        let b = Vector3::new(2.0, 5.0, 1.0);
        let c = Vector3::new(3.0, 0.0, 0.0);

        assert!(is_on_one_plane(&a, &wall, &b, &wall, 0.1));
        assert!(!is_on_one_plane(&a, &wall, &c, &wall, 0.1));
    }

    #[test]
    fn test_segments_intersect() {
        assert!(segments_intersect(&pt(0.0, 0.0), &pt(2.0, 2.0), &pt(0.0, 2.0), &pt(2.0, 0.0)));
        assert!(!segments_intersect(&pt(0.0, 0.0), &pt(1.0, 1.0), &pt(3.0, 0.0), &pt(2.0, 1.0)));
        // Shared endpoint
        assert!(segments_intersect(&pt(0.0, 0.0), &pt(1.0, 0.0), &pt(1.0, 0.0), &pt(1.0, 1.0)));
        // Parallel, even when collinear and overlapping
        assert!(!segments_intersect(&pt(0.0, 0.0), &pt(2.0, 0.0), &pt(1.0, 0.0), &pt(3.0, 0.0)));
    }

    #[test]
    fn test_hull_overlap_offset_squares() {
        let square = unit_square();
        let other = unit_square();
        let origin = PlaneVector::zeros();

        assert!(is_convex_hull_overlapping(&origin, &square, &PlaneVector::new(1.5, 0.0), &other));
        assert!(!is_convex_hull_overlapping(&origin, &square, &PlaneVector::new(3.0, 0.0), &other));
    }

    #[test]
    fn test_hull_overlap_same_hull_fast_path() {
        let square = unit_square();
        assert!(is_convex_hull_overlapping(
            &PlaneVector::zeros(),
            &square,
            &PlaneVector::new(100.0, 100.0),
            &square
        ));
    }

    #[test]
    fn test_hull_overlap_equal_values_still_tested() {
        let a = unit_square();
        let b = unit_square();
        assert!(!is_convex_hull_overlapping(
            &PlaneVector::zeros(),
            &a,
            &PlaneVector::new(100.0, 100.0),
            &b
        ));
    }

    #[test]
    fn test_hull_overlap_misses_full_containment() {
        let big = vec![pt(-5.0, -5.0), pt(5.0, -5.0), pt(5.0, 5.0), pt(-5.0, 5.0)];
        let small = unit_square();
        let origin = PlaneVector::zeros();
        assert!(!is_convex_hull_overlapping(&origin, &big, &origin, &small));
    }

    #[test]
    fn test_triangle_overlap_shared_edge() {
        let t1 = Triangle::new(pt(0.0, 0.0), pt(1.0, 0.0), pt(0.0, 1.0));
        let t2 = Triangle::new(pt(0.0, 0.0), pt(0.0, -1.0), pt(1.0, 0.0));

        assert_eq!(triangle_overlap(&t1, &t2, 0.0, false, true), Ok(true));
        assert_eq!(triangle_overlap(&t1, &t2, 0.0, false, false), Ok(false));
    }

    #[test]
    fn test_triangle_overlap_basic() {
        let t1 = Triangle::new(pt(0.0, 0.0), pt(5.0, 0.0), pt(0.0, 5.0));
        let t2 = Triangle::new(pt(0.0, 0.0), pt(5.0, 0.0), pt(0.0, 6.0));
        assert_eq!(triangle_overlap(&t1, &t2, 0.0, false, true), Ok(true));

        let far = Triangle::new(pt(10.0, 10.0), pt(12.0, 10.0), pt(10.0, 12.0));
        assert_eq!(triangle_overlap(&t1, &far, 0.0, false, true), Ok(false));
    }

    #[test]
    fn test_triangle_winding() {
        let clockwise = Triangle::new(pt(0.0, 0.0), pt(0.0, 5.0), pt(5.0, 0.0));
        let ccw = Triangle::new(pt(-10.0, 0.0), pt(-9.0, 0.0), pt(-10.0, 1.0));

        assert_eq!(
            triangle_overlap(&clockwise, &ccw, 0.0, false, true),
            Err(GeometryError::WrongWinding)
        );
        assert_eq!(triangle_overlap(&clockwise, &ccw, 0.0, true, true), Ok(false));

        let fixed = clockwise.with_ccw_winding(true).unwrap();
        assert!(fixed.det2d() > 0.0);
        assert_eq!(fixed.point(1), Some(pt(5.0, 0.0)));
        assert_eq!(fixed.point(3), None);
    }

    fn integer_points() -> impl Strategy<Value = Vec<PlanePoint>> {
        prop::collection::vec((-50i32..50, -50i32..50), 0..40).prop_map(|v| {
            v.into_iter()
                .map(|(x, y)| pt(f64::from(x), f64::from(y)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_hull_is_idempotent(points in integer_points()) {
            let hull = convex_hull(&points, false);
            let again = convex_hull(&hull, true);
            prop_assert_eq!(sorted(again), sorted(hull));
        }

        #[test]
        fn prop_hull_contains_all_points(points in integer_points()) {
            let hull = convex_hull(&points, false);
            prop_assume!(hull.len() >= 3);
            for p in &points {
                for i in 0..hull.len() {
                    let a = hull[i];
                    let b = hull[(i + 1) % hull.len()];
                    prop_assert!(cross(&a, &b, p) <= 1e-9, "{:?} outside edge {:?}->{:?}", p, a, b);
                }
            }
        }
    }
}
