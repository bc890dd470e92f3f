//! A simulated AR session: one registry per trackable kind, polled together.

use crate::anchor::{Anchor, AnchorRegistry};
use crate::environment_probe::{EnvironmentProbe, EnvironmentProbeRegistry};
use crate::ids::IdGenerator;
use crate::image_tracking::{ImageTrackingRegistry, TrackedImage};
use crate::object_tracking::{ObjectTrackingRegistry, TrackedObject};
use crate::plane::PlaneData;
use crate::plane_registry::{PlaneMergeConfig, PlaneRegistry};
use crate::point_cloud::{PointCloud, PointCloudRegistry};
use crate::reference::ReferenceLibrary;
use crate::registry::{ChangeSet, RegistryConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for a [`SimulationSession`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub registry: RegistryConfig,
    pub plane_merge: PlaneMergeConfig,

    /// Seed for anchor ids. Entropy-seeded when absent.
    pub id_seed: Option<u64>,
}

/// Everything that changed in one poll, per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionChanges {
    pub planes: ChangeSet<PlaneData>,
    pub point_clouds: ChangeSet<PointCloud>,
    pub anchors: ChangeSet<Anchor>,
    pub images: ChangeSet<TrackedImage>,
    pub objects: ChangeSet<TrackedObject>,
    pub probes: ChangeSet<EnvironmentProbe>,
}

impl SessionChanges {
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
            && self.point_clouds.is_empty()
            && self.anchors.is_empty()
            && self.images.is_empty()
            && self.objects.is_empty()
            && self.probes.is_empty()
    }

    /// Total number of entries across every kind and category.
    pub fn len(&self) -> usize {
        self.planes.len()
            + self.point_clouds.len()
            + self.anchors.len()
            + self.images.len()
            + self.objects.len()
            + self.probes.len()
    }
}

/// Owns every registry of a session. Producers mutate the registries directly;
/// the host calls [`poll`](Self::poll) once per tick.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    config: SessionConfig,
    pub planes: PlaneRegistry,
    pub point_clouds: PointCloudRegistry,
    pub anchors: AnchorRegistry,
    pub images: ImageTrackingRegistry,
    pub objects: ObjectTrackingRegistry,
    pub probes: EnvironmentProbeRegistry,
    poll_count: u64,
}

impl SimulationSession {
    pub fn new(config: SessionConfig) -> Self {
        let registry = config.registry;
        info!(
            "Starting simulation session (plane merging: {}, id seed: {:?})",
            config.plane_merge.enabled, config.id_seed
        );

        Self {
            planes: PlaneRegistry::new(registry, config.plane_merge),
            point_clouds: PointCloudRegistry::new(registry),
            anchors: AnchorRegistry::new(registry, IdGenerator::new(config.id_seed)),
            images: ImageTrackingRegistry::new(registry, ReferenceLibrary::default()),
            objects: ObjectTrackingRegistry::new(registry, ReferenceLibrary::default()),
            probes: EnvironmentProbeRegistry::new(registry),
            config,
            poll_count: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    /// Reconciles every registry: planes, point clouds, anchors, images, objects, probes.
    pub fn poll(&mut self) -> SessionChanges {
        let changes = SessionChanges {
            planes: self.planes.reconcile(),
            point_clouds: self.point_clouds.reconcile(),
            anchors: self.anchors.reconcile(),
            images: self.images.reconcile(),
            objects: self.objects.reconcile(),
            probes: self.probes.reconcile(),
        };
        self.poll_count += 1;

        if !changes.is_empty() {
            debug!("Poll {}: {} changes", self.poll_count, changes.len());
        }
        changes
    }

    /// Number of tracked entities across every kind.
    pub fn tracked_count(&self) -> usize {
        self.planes.tracked_count()
            + self.point_clouds.tracked_count()
            + self.anchors.tracked_count()
            + self.images.tracked_count()
            + self.objects.tracked_count()
            + self.probes.tracked_count()
    }

    /// Clears every registry, pending and tracked. Reference libraries are kept.
    pub fn teardown(&mut self) {
        info!("Tearing down session after {} polls", self.poll_count);
        self.planes.clear();
        self.point_clouds.clear();
        self.anchors.clear();
        self.images.clear();
        self.objects.clear();
        self.probes.clear();
        self.poll_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment_probe::EnvironmentProbe;
    use crate::plane::BoundedPlane;
    use crate::types::{PlanePoint, PlaneVector, Pose, TrackableId};
    use nalgebra::Vector3;

    fn square_plane(id: u64, x: f64) -> PlaneData {
        let plane = BoundedPlane::new(
            TrackableId::new(id, 0),
            Pose::from_position(Vector3::new(x, 0.0, 0.0)),
            PlaneVector::new(2.0, 2.0),
        );
        let bounds = vec![
            PlanePoint::new(-1.0, -1.0),
            PlanePoint::new(1.0, -1.0),
            PlanePoint::new(1.0, 1.0),
            PlanePoint::new(-1.0, 1.0),
        ];
        PlaneData::new(plane, Some(bounds), true).unwrap()
    }

    fn session() -> SimulationSession {
        SimulationSession::new(SessionConfig {
            id_seed: Some(11),
            ..SessionConfig::default()
        })
    }

    #[test]
    fn test_poll_reports_every_kind() {
        let mut session = session();
        session.planes.register(square_plane(1, 0.0));
        session
            .point_clouds
            .register(TrackableId::new(2, 0), Pose::identity(), vec![Vector3::zeros()]);
        session.anchors.try_add_anchor(Pose::identity());
        session.probes.register(EnvironmentProbe::new(
            TrackableId::new(3, 0),
            Pose::identity(),
            Vector3::new(1.0, 1.0, 1.0),
        ));

        let changes = session.poll();
        assert_eq!(changes.planes.added.len(), 1);
        assert_eq!(changes.point_clouds.added.len(), 1);
        assert_eq!(changes.anchors.added.len(), 1);
        assert_eq!(changes.probes.added.len(), 1);
        assert_eq!(changes.len(), 4);
        assert_eq!(session.tracked_count(), 4);
        assert_eq!(session.poll_count(), 1);

        assert!(session.poll().is_empty());
    }

    #[test]
    fn test_plane_merge_through_session() {
        let mut session = session();
        session.planes.register(square_plane(1, 0.0));
        session.planes.register(square_plane(2, 1.5));

        let changes = session.poll();
        assert_eq!(
            changes.planes.added_ids().collect::<Vec<_>>(),
            vec![TrackableId::new(1, 0)]
        );
        assert_eq!(session.planes.tracked_count(), 1);
    }

    #[test]
    fn test_changes_serialize_to_json() {
        let mut session = session();
        session.planes.register(square_plane(1, 0.0));
        let changes = session.poll();

        let json = serde_json::to_value(&changes).unwrap();
        assert_eq!(json["planes"]["added"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["anchors"]["added"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn test_teardown_clears_everything() {
        let mut session = session();
        session.planes.register(square_plane(1, 0.0));
        session.poll();
        session.planes.register(square_plane(5, 10.0));

        session.teardown();
        assert_eq!(session.tracked_count(), 0);
        assert!(session.planes.pending().is_empty());
        assert!(session.poll().is_empty());
    }
}
