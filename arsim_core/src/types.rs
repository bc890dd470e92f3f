//! Common types shared by every trackable kind.

use nalgebra::{Point2, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 2D point in a plane's local frame (x, z of the plane's pose).
pub type PlanePoint = Point2<f64>;

/// A 2D offset, used for world-space boundary centres and plane extents.
pub type PlaneVector = Vector2<f64>;

/// Opaque 128-bit identifier of a tracked entity, stored as two 64-bit words.
///
/// The id names one entity for its whole tracked lifetime. Equality is by value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrackableId {
    pub sub_id1: u64,
    pub sub_id2: u64,
}

impl TrackableId {
    /// The all-zero id, used where a slot names no entity (e.g. an unsubsumed plane).
    pub const INVALID: TrackableId = TrackableId { sub_id1: 0, sub_id2: 0 };

    pub const fn new(sub_id1: u64, sub_id2: u64) -> Self {
        Self { sub_id1, sub_id2 }
    }

    /// Derives an id deterministically from a stable object handle and an instance id.
    ///
    /// Two calls with the same pair always yield the same id, which lets a producer
    /// re-register the same scene object across frames without remembering its id.
    pub fn from_handle(handle: u64, instance_id: i64) -> Self {
        Self::new(handle, instance_id as u64)
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        let (hi, lo) = uuid.as_u64_pair();
        Self::new(hi, lo)
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_u64_pair(self.sub_id1, self.sub_id2)
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl From<Uuid> for TrackableId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl std::fmt::Display for TrackableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}-{:016X}", self.sub_id1, self.sub_id2)
    }
}

/// Tracking quality reported by producers. Passed through untouched by the registries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingState {
    #[default]
    None,
    Limited,
    Tracking,
}

/// Position + orientation in one reference frame (world or session space, producer's choice).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at `position` with no rotation.
    pub fn from_position(position: Vector3<f64>) -> Self {
        Self::new(position, UnitQuaternion::identity())
    }

    /// Position and rotation hold no NaN or infinite components.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite())
    }

    /// Local "up" axis of this pose (its rotated +Y).
    #[inline]
    pub fn up(&self) -> Vector3<f64> {
        self.rotation * Vector3::y()
    }

    /// Maps a point from this pose's local frame into the parent frame.
    #[inline]
    pub fn transform_point(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local + self.position
    }

    /// Maps a point from the parent frame into this pose's local frame.
    #[inline]
    pub fn inverse_transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * (point - self.position)
    }

    /// Expresses this pose relative to `origin`, e.g. world space into session space.
    pub fn relative_to(&self, origin: &Pose) -> Pose {
        let inv = origin.rotation.inverse();
        Pose {
            position: inv * (self.position - origin.position),
            rotation: inv * self.rotation,
        }
    }
}
