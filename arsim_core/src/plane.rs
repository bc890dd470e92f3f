//! Plane records: the host-facing `BoundedPlane` and the boundary-carrying `PlaneData`.

use crate::error::GeometryError;
use crate::geometry::{convex_hull, is_convex_hull_overlapping, is_on_one_plane};
use crate::types::{PlanePoint, PlaneVector, Pose, TrackableId, TrackingState};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Offset pushed along the normal when a plane is fitted to sampled points.
pub const DEFAULT_SURFACE_OFFSET: f64 = 1e-4;

/// Tolerance on `dot(normal, up)` when classifying alignment.
const ALIGNMENT_DOT_TOLERANCE: f64 = 1e-4;

/// Minimum length of the fitted forward axis.
const MIN_FORWARD_LENGTH: f64 = 1e-4;

// ============================================================================
// ALIGNMENT / CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneAlignment {
    #[default]
    None,
    HorizontalUp,
    HorizontalDown,
    Vertical,
    NotAxisAligned,
}

impl PlaneAlignment {
    /// Classifies a surface normal against world up.
    pub fn from_normal(normal: &Vector3<f64>) -> Self {
        let Some(n) = normal.try_normalize(f64::EPSILON) else {
            return PlaneAlignment::NotAxisAligned;
        };

        let up_dot = n.dot(&Vector3::y());
        if (up_dot - 1.0).abs() < ALIGNMENT_DOT_TOLERANCE {
            PlaneAlignment::HorizontalUp
        } else if (up_dot + 1.0).abs() < ALIGNMENT_DOT_TOLERANCE {
            PlaneAlignment::HorizontalDown
        } else if up_dot.abs() < ALIGNMENT_DOT_TOLERANCE {
            PlaneAlignment::Vertical
        } else {
            PlaneAlignment::NotAxisAligned
        }
    }
}

/// Semantic label of a plane, passed through from producers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneClassification {
    #[default]
    None,
    Wall,
    Floor,
    Ceiling,
    Table,
    Seat,
    Door,
    Window,
}

// ============================================================================
// BOUNDED PLANE
// ============================================================================

/// A detected plane as reported to the host: pose, rectangular extent and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedPlane {
    pub id: TrackableId,

    /// Plane that absorbed this one, `TrackableId::INVALID` if none.
    pub subsumed_by: TrackableId,

    pub pose: Pose,

    /// Centre of the rectangle in the plane's local frame.
    pub center: PlaneVector,

    /// Full width/height of the rectangle in the plane's local frame.
    pub size: PlaneVector,

    pub alignment: PlaneAlignment,
    pub tracking_state: TrackingState,
    pub classification: PlaneClassification,
}

impl BoundedPlane {
    /// A tracking plane centred on its pose. Alignment is derived from the pose's up axis.
    pub fn new(id: TrackableId, pose: Pose, size: PlaneVector) -> Self {
        Self {
            id,
            subsumed_by: TrackableId::INVALID,
            pose,
            center: PlaneVector::zeros(),
            size,
            alignment: PlaneAlignment::from_normal(&pose.up()),
            tracking_state: TrackingState::Tracking,
            classification: PlaneClassification::None,
        }
    }

    pub fn with_classification(mut self, classification: PlaneClassification) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_tracking_state(mut self, tracking_state: TrackingState) -> Self {
        self.tracking_state = tracking_state;
        self
    }

    /// Half of `size`.
    #[inline]
    pub fn extents(&self) -> PlaneVector {
        self.size * 0.5
    }

    /// Fits a plane to sampled surface points (e.g. raycast hits).
    ///
    /// The pose sits at the mean of the points, pushed `offset` along `normal`, looking
    /// along `points[0] - points[2]` with `normal` as up. Returns the plane together with
    /// the convex hull of the points in the plane's local frame.
    ///
    /// Returns `None` for fewer than 3 points, or a forward axis that is degenerate or
    /// parallel to `normal`.
    pub fn from_points(
        id: TrackableId,
        points: &[Vector3<f64>],
        normal: &Vector3<f64>,
        offset: f64,
    ) -> Option<(BoundedPlane, Vec<PlanePoint>)> {
        if points.len() < 3 {
            warn!("Expecting at least 3 points to fit a plane, got {}", points.len());
            return None;
        }

        let forward = (points[0] - points[2]).try_normalize(MIN_FORWARD_LENGTH)?;
        let up = normal.try_normalize(f64::EPSILON)?;
        if forward.cross(&up).norm() < MIN_FORWARD_LENGTH {
            warn!("Fitted forward axis is parallel to the plane normal");
            return None;
        }
        let rotation = UnitQuaternion::face_towards(&forward, &up);
        let inverse_rotation = rotation.inverse();

        let mean = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / points.len() as f64;
        let center = mean + up * offset;

        let mut min = PlaneVector::zeros();
        let mut max = PlaneVector::zeros();
        let mut local_points = Vec::with_capacity(points.len());
        for p in points {
            let local = inverse_rotation * (p - center);
            min.x = min.x.min(local.x);
            min.y = min.y.min(local.z);
            max.x = max.x.max(local.x);
            max.y = max.y.max(local.z);
            local_points.push(PlanePoint::new(local.x, local.z));
        }

        let hull = convex_hull(&local_points, false);
        let mut plane = BoundedPlane::new(id, Pose::new(center, rotation), max - min);
        plane.alignment = PlaneAlignment::from_normal(&up);

        Some((plane, hull))
    }
}

// ============================================================================
// PLANE DATA
// ============================================================================

/// A plane plus its 2D boundary polygon, as held by the plane registry.
///
/// `bounds` always has at least 3 points when built through [`PlaneData::new`] or
/// [`PlaneData::with_default_bounds`]. The bounds centre is always read from the
/// current pose, so editing `plane.pose` moves the boundary with it.
///
/// Equality compares id, bounds centre and bounds only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneData {
    pub plane: BoundedPlane,
    bounds: Vec<PlanePoint>,
    pub allow_merging: bool,
}

impl PlaneData {
    /// Builds plane data from an explicit boundary, or the default rectangle when `None`.
    ///
    /// A boundary with fewer than 3 points is a contract violation.
    pub fn new(
        plane: BoundedPlane,
        bounds: Option<Vec<PlanePoint>>,
        allow_merging: bool,
    ) -> Result<Self, GeometryError> {
        match bounds {
            Some(bounds) if bounds.len() < 3 => Err(GeometryError::InsufficientBoundary {
                count: bounds.len(),
            }),
            Some(bounds) => Ok(Self::from_parts(plane, bounds, allow_merging)),
            None => Ok(Self::with_default_bounds(plane, allow_merging)),
        }
    }

    /// Plane data whose boundary is the plane's centre ± extents rectangle.
    pub fn with_default_bounds(plane: BoundedPlane, allow_merging: bool) -> Self {
        let bounds = Self::default_rectangle(&plane);
        Self::from_parts(plane, bounds, allow_merging)
    }

    fn from_parts(plane: BoundedPlane, bounds: Vec<PlanePoint>, allow_merging: bool) -> Self {
        Self {
            plane,
            bounds,
            allow_merging,
        }
    }

    fn default_rectangle(plane: &BoundedPlane) -> Vec<PlanePoint> {
        let c = PlanePoint::from(plane.center);
        let e = plane.extents();
        vec![
            c + e,
            c + PlaneVector::new(e.x, -e.y),
            c - e,
            c + PlaneVector::new(-e.x, e.y),
        ]
    }

    #[inline]
    pub fn id(&self) -> TrackableId {
        self.plane.id
    }

    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.plane.pose
    }

    #[inline]
    pub fn bounds(&self) -> &[PlanePoint] {
        &self.bounds
    }

    /// World-space (x, z) of the pose.
    #[inline]
    pub fn bounds_center(&self) -> PlaneVector {
        PlaneVector::new(self.plane.pose.position.x, self.plane.pose.position.z)
    }

    #[inline]
    pub fn has_bounds(&self) -> bool {
        self.bounds.len() >= 3
    }

    /// Both planes allow merging and carry a real boundary.
    pub fn can_merge_with(&self, other: &PlaneData) -> bool {
        self.allow_merging && other.allow_merging && self.has_bounds() && other.has_bounds()
    }

    pub fn is_on_one_plane(&self, other: &PlaneData, eps: f64) -> bool {
        is_on_one_plane(
            &self.plane.pose.position,
            &self.plane.pose.rotation,
            &other.plane.pose.position,
            &other.plane.pose.rotation,
            eps,
        )
    }

    pub fn overlaps(&self, other: &PlaneData) -> bool {
        is_convex_hull_overlapping(
            &self.bounds_center(),
            &self.bounds,
            &other.bounds_center(),
            &other.bounds,
        )
    }
}

impl PartialEq for PlaneData {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
            && self.bounds_center() == other.bounds_center()
            && self.bounds == other.bounds
    }
}

/// Folds `merge`'s boundary into `keep`, expressed in `keep`'s local frame.
///
/// Each boundary point of `merge` goes local → world through `merge`'s pose, then
/// world → local through the inverse of `keep`'s pose, and the combined point set
/// is re-hulled. Everything except the boundary comes from `keep`, including
/// `allow_merging`.
pub fn merge_planes(keep: &PlaneData, merge: &PlaneData) -> Result<PlaneData, GeometryError> {
    let keep_pose = &keep.plane.pose;

    let mut bounds = keep.bounds.clone();
    bounds.extend(merge.bounds.iter().map(|pt| {
        let world = merge.plane.pose.transform_point(&Vector3::new(pt.x, 0.0, pt.y));
        let local = keep_pose.inverse_transform_point(&world);
        PlanePoint::new(local.x, local.z)
    }));

    let hull = convex_hull(&bounds, false);
    if hull.len() < 3 {
        return Err(GeometryError::DegenerateHull { count: hull.len() });
    }

    Ok(PlaneData {
        plane: keep.plane.clone(),
        bounds: hull,
        allow_merging: keep.allow_merging,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, SQRT_2};

    fn square() -> Vec<PlanePoint> {
        vec![
            PlanePoint::new(-1.0, -1.0),
            PlanePoint::new(1.0, -1.0),
            PlanePoint::new(1.0, 1.0),
            PlanePoint::new(-1.0, 1.0),
        ]
    }

    fn plane_at(id: u64, x: f64, y: f64, z: f64) -> PlaneData {
        let plane = BoundedPlane::new(
            TrackableId::new(id, 0),
            Pose::from_position(Vector3::new(x, y, z)),
            PlaneVector::new(2.0, 2.0),
        );
        PlaneData::new(plane, Some(square()), true).unwrap()
    }

    fn extent(points: &[PlanePoint]) -> (f64, f64, f64, f64) {
        points.iter().fold(
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
            |(min_x, max_x, min_y, max_y), p| {
                (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y))
            },
        )
    }

    #[test]
    fn test_alignment_from_normal() {
        assert_eq!(PlaneAlignment::from_normal(&Vector3::y()), PlaneAlignment::HorizontalUp);
        assert_eq!(
            PlaneAlignment::from_normal(&Vector3::new(0.0, -3.0, 0.0)),
            PlaneAlignment::HorizontalDown
        );
        assert_eq!(PlaneAlignment::from_normal(&Vector3::x()), PlaneAlignment::Vertical);
        assert_eq!(
            PlaneAlignment::from_normal(&Vector3::new(1.0, 1.0, 0.0)),
            PlaneAlignment::NotAxisAligned
        );
        assert_eq!(
            PlaneAlignment::from_normal(&Vector3::zeros()),
            PlaneAlignment::NotAxisAligned
        );
    }

    #[test]
    fn test_default_rectangle_from_extents() {
        let plane = BoundedPlane::new(
            TrackableId::new(1, 1),
            Pose::identity(),
            PlaneVector::new(4.0, 2.0),
        );
        let data = PlaneData::new(plane, None, true).unwrap();

        assert!(data.has_bounds());
        assert_eq!(
            data.bounds(),
            &[
                PlanePoint::new(2.0, 1.0),
                PlanePoint::new(2.0, -1.0),
                PlanePoint::new(-2.0, -1.0),
                PlanePoint::new(-2.0, 1.0),
            ]
        );
    }

    #[test]
    fn test_insufficient_boundary_rejected() {
        let plane = BoundedPlane::new(TrackableId::new(1, 1), Pose::identity(), PlaneVector::zeros());
        let result = PlaneData::new(
            plane,
            Some(vec![PlanePoint::new(0.0, 0.0), PlanePoint::new(1.0, 0.0)]),
            true,
        );
        assert_eq!(result, Err(GeometryError::InsufficientBoundary { count: 2 }));
    }

    #[test]
    fn test_bounds_center_is_pose_xz() {
        let data = plane_at(1, 3.0, 7.0, -2.0);
        assert_eq!(data.bounds_center(), PlaneVector::new(3.0, -2.0));
    }

    #[test]
    fn test_bounds_center_follows_pose_edits() {
        let mut moved = plane_at(1, 0.0, 0.0, 0.0);
        let neighbour = plane_at(2, 0.5, 0.0, 0.5);
        assert!(moved.overlaps(&neighbour));

        moved.plane.pose.position.x = 100.0;
        assert_eq!(moved.bounds_center(), PlaneVector::new(100.0, 0.0));
        assert!(!moved.overlaps(&neighbour));
    }

    #[test]
    fn test_equality_ignores_labels_and_merge_flag() {
        let a = plane_at(1, 2.0, 0.0, 3.0);
        let mut b = a.clone();
        b.allow_merging = false;
        b.plane.classification = PlaneClassification::Wall;
        b.plane.pose.position.y = 5.0;
        assert_eq!(a, b);

        b.plane.pose.position.z = 4.0;
        assert_ne!(a, b);
        assert_ne!(a, plane_at(2, 2.0, 0.0, 3.0));
    }

    #[test]
    fn test_merge_collinear_boundaries_is_degenerate() {
        let line = |id: u64, x: f64| {
            let plane = BoundedPlane::new(
                TrackableId::new(id, 0),
                Pose::from_position(Vector3::new(x, 0.0, 0.0)),
                PlaneVector::new(2.0, 0.0),
            );
            let bounds = vec![
                PlanePoint::new(-1.0, 0.0),
                PlanePoint::new(0.0, 0.0),
                PlanePoint::new(1.0, 0.0),
            ];
            PlaneData::new(plane, Some(bounds), true).unwrap()
        };

        let result = merge_planes(&line(1, 0.0), &line(2, 0.5));
        assert_eq!(result, Err(GeometryError::DegenerateHull { count: 2 }));
    }

    #[test]
    fn test_merge_offset_planes() {
        let keep = plane_at(1, 0.0, 0.0, 0.0);
        let merge = plane_at(2, 1.5, 0.0, 0.0);

        assert!(keep.is_on_one_plane(&merge, 0.1));
        assert!(keep.overlaps(&merge));

        let merged = merge_planes(&keep, &merge).unwrap();
        assert_eq!(merged.id(), keep.id());
        assert_eq!(merged.bounds().len(), 4);

        let (min_x, max_x, min_y, max_y) = extent(merged.bounds());
        assert_relative_eq!(min_x, -1.0);
        assert_relative_eq!(max_x, 2.5);
        assert_relative_eq!(min_y, -1.0);
        assert_relative_eq!(max_y, 1.0);
    }

    #[test]
    fn test_merge_into_rotated_frame() {
        let mut keep = plane_at(1, 0.0, 0.0, 0.0);
        keep.plane.pose.rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        let merge = plane_at(2, 3.0, 0.0, 0.0);

        let merged = merge_planes(&keep, &merge).unwrap();
        let (min_x, max_x, min_y, max_y) = extent(merged.bounds());

        // World +X maps onto the keep plane's local +Z after a 90° turn about Y
        assert_relative_eq!(min_x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(max_x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(min_y, -1.0, epsilon = 1e-9);
        assert_relative_eq!(max_y, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_merge_keeps_non_geometric_fields_of_keep() {
        let mut keep = plane_at(1, 0.0, 0.0, 0.0);
        keep.plane.classification = PlaneClassification::Floor;
        keep.allow_merging = false;
        let mut merge = plane_at(2, 1.0, 0.0, 0.0);
        merge.plane.classification = PlaneClassification::Table;
        merge.plane.tracking_state = TrackingState::Limited;

        let merged = merge_planes(&keep, &merge).unwrap();
        assert_eq!(merged.plane, keep.plane);
        assert!(!merged.allow_merging);
    }

    #[test]
    fn test_from_points_fits_floor_patch() {
        let points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 2.0),
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(1.0, 0.0, 1.0),
        ];
        let (plane, hull) = BoundedPlane::from_points(
            TrackableId::new(9, 9),
            &points,
            &Vector3::y(),
            DEFAULT_SURFACE_OFFSET,
        )
        .unwrap();

        assert_eq!(plane.alignment, PlaneAlignment::HorizontalUp);
        assert_relative_eq!(
            plane.pose.position,
            Vector3::new(1.0, DEFAULT_SURFACE_OFFSET, 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(plane.pose.up(), Vector3::y(), epsilon = 1e-9);
        assert_eq!(hull.len(), 4);
        assert_relative_eq!(plane.size.x, 2.0 * SQRT_2, epsilon = 1e-9);
    }

    #[test]
    fn test_from_points_rejects_degenerate_input() {
        let id = TrackableId::new(1, 2);
        let two = vec![Vector3::zeros(), Vector3::x()];
        assert!(BoundedPlane::from_points(id, &two, &Vector3::y(), 0.0).is_none());

        let same_forward = vec![Vector3::zeros(), Vector3::x(), Vector3::zeros()];
        assert!(BoundedPlane::from_points(id, &same_forward, &Vector3::y(), 0.0).is_none());

        // Forward axis along the normal
        let vertical = vec![Vector3::y(), Vector3::x(), Vector3::zeros()];
        assert!(BoundedPlane::from_points(id, &vertical, &Vector3::y(), 0.0).is_none());
    }
}
