//! ARSim Core - Trackable Change-Set Registry and Plane Geometry Engine
//!
//! The core of a simulated AR session provider:
//! 1. **Reconciliation**: producers queue register/update/unregister calls during a tick;
//!    one `reconcile` per poll turns them into a clean added/updated/removed diff against
//!    the persistently tracked set (planes, point clouds, anchors, images, objects, probes)
//! 2. **Geometry**: 2D convex hulls, coplanarity, hull overlap and triangle overlap
//! 3. **Plane merging**: coplanar overlapping planes are folded into one before reconcile

pub mod anchor;
pub mod environment_probe;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod image_tracking;
pub mod object_tracking;
pub mod plane;
pub mod plane_registry;
pub mod point_cloud;
pub mod reference;
pub mod registry;
pub mod session;
pub mod shared;
pub mod types;

// Re-export key types for convenience
pub use anchor::{Anchor, AnchorRegistry};
pub use environment_probe::{EnvironmentProbe, EnvironmentProbeRegistry};
pub use error::GeometryError;
pub use geometry::{convex_hull, is_convex_hull_overlapping, is_on_one_plane, triangle_overlap, Triangle};
pub use ids::IdGenerator;
pub use image_tracking::{ImageTrackingRegistry, TrackedImage};
pub use object_tracking::{ObjectTrackingRegistry, TrackedObject};
pub use plane::{merge_planes, BoundedPlane, PlaneAlignment, PlaneClassification, PlaneData};
pub use plane_registry::{PlaneMergeConfig, PlaneRegistry};
pub use point_cloud::{PointCloud, PointCloudData, PointCloudRegistry};
pub use reference::{ReferenceEntry, ReferenceLibrary};
pub use registry::{ChangeSet, PendingBucket, PendingChanges, RegistryConfig, Trackable, TrackableRegistry};
pub use session::{SessionChanges, SessionConfig, SimulationSession};
pub use shared::SharedRegistry;
pub use types::{PlanePoint, PlaneVector, Pose, TrackableId, TrackingState};
