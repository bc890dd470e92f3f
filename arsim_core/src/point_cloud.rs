//! Point clouds (feature points) with per-point identifiers and confidences.

use crate::registry::{ChangeSet, PendingChanges, RegistryConfig, Trackable, TrackableRegistry};
use crate::types::{Pose, TrackableId, TrackingState};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Confidence given to points whose producer supplied none.
pub const DEFAULT_POINT_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub id: TrackableId,
    pub pose: Pose,
    pub tracking_state: TrackingState,
    pub positions: Vec<Vector3<f64>>,
    pub identifiers: Vec<u64>,
    pub confidences: Vec<f32>,
}

impl Trackable for PointCloud {
    const KIND: &'static str = "point cloud";

    fn trackable_id(&self) -> TrackableId {
        self.id
    }
}

/// Positions, identifiers and confidences of one tracked cloud. Empty for unknown ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloudData {
    pub positions: Vec<Vector3<f64>>,
    pub identifiers: Vec<u64>,
    pub confidences: Vec<f32>,
}

impl PointCloudData {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PointCloudRegistry {
    inner: TrackableRegistry<PointCloud>,
    next_identifier: u64,
}

impl PointCloudRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: TrackableRegistry::new(config),
            next_identifier: 0,
        }
    }

    pub fn register(&mut self, id: TrackableId, pose: Pose, points: Vec<Vector3<f64>>) {
        let cloud = self.build(id, pose, points, None);
        self.inner.register(cloud);
    }

    /// Like [`register`](Self::register) with explicit per-point confidences.
    ///
    /// Missing confidences are filled with [`DEFAULT_POINT_CONFIDENCE`], extra ones dropped.
    pub fn register_with_confidences(
        &mut self,
        id: TrackableId,
        pose: Pose,
        points: Vec<Vector3<f64>>,
        confidences: Vec<f32>,
    ) {
        let cloud = self.build(id, pose, points, Some(confidences));
        self.inner.register(cloud);
    }

    pub fn update(&mut self, id: TrackableId, pose: Pose, points: Vec<Vector3<f64>>) {
        let cloud = self.build(id, pose, points, None);
        self.inner.update(cloud);
    }

    pub fn update_with_confidences(
        &mut self,
        id: TrackableId,
        pose: Pose,
        points: Vec<Vector3<f64>>,
        confidences: Vec<f32>,
    ) {
        let cloud = self.build(id, pose, points, Some(confidences));
        self.inner.update(cloud);
    }

    pub fn unregister(&mut self, id: TrackableId) {
        self.inner.unregister(id);
    }

    pub fn reconcile(&mut self) -> ChangeSet<PointCloud> {
        self.inner.reconcile()
    }

    pub fn point_cloud_data(&self, id: TrackableId) -> PointCloudData {
        match self.inner.get(id) {
            Some(cloud) => PointCloudData {
                positions: cloud.positions.clone(),
                identifiers: cloud.identifiers.clone(),
                confidences: cloud.confidences.clone(),
            },
            None => PointCloudData::default(),
        }
    }

    pub fn is_tracked(&self, id: TrackableId) -> bool {
        self.inner.is_tracked(id)
    }

    pub fn get(&self, id: TrackableId) -> Option<&PointCloud> {
        self.inner.get(id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &PointCloud> {
        self.inner.tracked()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.tracked_count()
    }

    pub fn pending(&self) -> &PendingChanges<PointCloud> {
        self.inner.pending()
    }

    /// Drops all clouds. Point identifiers keep counting up.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    fn build(
        &mut self,
        id: TrackableId,
        pose: Pose,
        positions: Vec<Vector3<f64>>,
        confidences: Option<Vec<f32>>,
    ) -> PointCloud {
        let start = self.next_identifier;
        self.next_identifier += positions.len() as u64;
        let identifiers = (start..self.next_identifier).collect();

        let mut confidences = confidences.unwrap_or_default();
        confidences.resize(positions.len(), DEFAULT_POINT_CONFIDENCE);

        PointCloud {
            id,
            pose,
            tracking_state: TrackingState::Tracking,
            positions,
            identifiers,
            confidences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<Vector3<f64>> {
        (0..n).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_identifiers_are_unique_and_increasing() {
        let mut registry = PointCloudRegistry::default();
        registry.register(TrackableId::new(1, 1), Pose::identity(), points(3));
        registry.register(TrackableId::new(2, 2), Pose::identity(), points(2));
        registry.reconcile();

        let a = registry.point_cloud_data(TrackableId::new(1, 1));
        let b = registry.point_cloud_data(TrackableId::new(2, 2));
        assert_eq!(a.identifiers, vec![0, 1, 2]);
        assert_eq!(b.identifiers, vec![3, 4]);
    }

    #[test]
    fn test_update_assigns_fresh_identifiers() {
        let mut registry = PointCloudRegistry::default();
        let id = TrackableId::new(1, 1);
        registry.register(id, Pose::identity(), points(2));
        registry.reconcile();
        registry.update(id, Pose::identity(), points(2));

        let changes = registry.reconcile();
        assert_eq!(changes.updated.len(), 1);
        assert_eq!(registry.point_cloud_data(id).identifiers, vec![2, 3]);
    }

    #[test]
    fn test_confidences_default_and_resize() {
        let mut registry = PointCloudRegistry::default();
        registry.register(TrackableId::new(1, 1), Pose::identity(), points(2));
        registry.register_with_confidences(
            TrackableId::new(2, 2),
            Pose::identity(),
            points(3),
            vec![0.5],
        );
        registry.reconcile();

        assert_eq!(registry.point_cloud_data(TrackableId::new(1, 1)).confidences, vec![1.0, 1.0]);
        assert_eq!(
            registry.point_cloud_data(TrackableId::new(2, 2)).confidences,
            vec![0.5, 1.0, 1.0]
        );
    }

    #[test]
    fn test_unknown_cloud_has_empty_data() {
        let registry = PointCloudRegistry::default();
        assert!(registry.point_cloud_data(TrackableId::new(5, 5)).is_empty());
    }

    #[test]
    fn test_unregister_removes_cloud() {
        let mut registry = PointCloudRegistry::default();
        let id = TrackableId::new(1, 1);
        registry.register(id, Pose::identity(), points(1));
        registry.reconcile();
        registry.unregister(id);

        assert_eq!(registry.reconcile().removed, vec![id]);
        assert!(registry.point_cloud_data(id).is_empty());
    }
}
