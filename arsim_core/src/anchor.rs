//! Anchors created, attached and removed through the anchor API.

use crate::ids::IdGenerator;
use crate::registry::{ChangeSet, PendingChanges, RegistryConfig, Trackable, TrackableRegistry};
use crate::types::{Pose, TrackableId, TrackingState};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: TrackableId,
    pub pose: Pose,
    pub tracking_state: TrackingState,

    /// Trackable this anchor was attached to, if created through `try_attach_anchor`.
    pub attached_to: Option<TrackableId>,
}

impl Trackable for Anchor {
    const KIND: &'static str = "anchor";

    fn trackable_id(&self) -> TrackableId {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct AnchorRegistry {
    inner: TrackableRegistry<Anchor>,
    ids: IdGenerator,
}

impl AnchorRegistry {
    pub fn new(config: RegistryConfig, ids: IdGenerator) -> Self {
        Self {
            inner: TrackableRegistry::new(config),
            ids,
        }
    }

    /// Creates an anchor at `pose` with a fresh id and queues it as added.
    ///
    /// Returns `None` for a pose with non-finite components.
    pub fn try_add_anchor(&mut self, pose: Pose) -> Option<Anchor> {
        self.create_anchor(pose, None)
    }

    /// Same as [`try_add_anchor`](Self::try_add_anchor), remembering the attachment.
    /// Also returns `None` when `trackable` is the invalid id.
    pub fn try_attach_anchor(&mut self, trackable: TrackableId, pose: Pose) -> Option<Anchor> {
        if !trackable.is_valid() {
            warn!("Refusing to attach anchor to invalid trackable");
            return None;
        }
        self.create_anchor(pose, Some(trackable))
    }

    /// Queues removal of a tracked anchor. Returns `false` for ids not tracked.
    pub fn try_remove_anchor(&mut self, id: TrackableId) -> bool {
        if !self.inner.is_tracked(id) {
            return false;
        }
        self.inner.unregister(id);
        true
    }

    pub fn update(&mut self, anchor: Anchor) {
        self.inner.update(anchor);
    }

    /// Reconciles and promotes newly tracked anchors to `Tracking`.
    pub fn reconcile(&mut self) -> ChangeSet<Anchor> {
        let mut changes = self.inner.reconcile();
        for anchor in &mut changes.added {
            anchor.tracking_state = TrackingState::Tracking;
            if let Some(stored) = self.inner.tracked.get_mut(&anchor.id) {
                stored.tracking_state = TrackingState::Tracking;
            }
        }
        changes
    }

    pub fn is_tracked(&self, id: TrackableId) -> bool {
        self.inner.is_tracked(id)
    }

    pub fn get(&self, id: TrackableId) -> Option<&Anchor> {
        self.inner.get(id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &Anchor> {
        self.inner.tracked()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.tracked_count()
    }

    pub fn pending(&self) -> &PendingChanges<Anchor> {
        self.inner.pending()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    fn create_anchor(&mut self, pose: Pose, attached_to: Option<TrackableId>) -> Option<Anchor> {
        if !pose.is_finite() {
            warn!("Refusing to create anchor at non-finite pose");
            return None;
        }
        let anchor = Anchor {
            id: self.ids.next_id(),
            pose,
            tracking_state: TrackingState::None,
            attached_to,
        };
        debug!("Created anchor {}", anchor.id);
        self.inner.register(anchor);
        Some(anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn registry() -> AnchorRegistry {
        AnchorRegistry::new(RegistryConfig::default(), IdGenerator::from_seed(3))
    }

    #[test]
    fn test_added_anchor_is_promoted_to_tracking() {
        let mut anchors = registry();
        let anchor = anchors.try_add_anchor(Pose::identity()).unwrap();
        assert_eq!(anchor.tracking_state, TrackingState::None);

        let changes = anchors.reconcile();
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].tracking_state, TrackingState::Tracking);
        assert_eq!(
            anchors.get(anchor.id).map(|a| a.tracking_state),
            Some(TrackingState::Tracking)
        );
    }

    #[test]
    fn test_attach_records_trackable() {
        let mut anchors = registry();
        let plane_id = TrackableId::new(7, 7);
        let anchor = anchors
            .try_attach_anchor(plane_id, Pose::from_position(Vector3::new(0.0, 1.0, 0.0)))
            .unwrap();
        anchors.reconcile();

        assert_eq!(anchors.get(anchor.id).and_then(|a| a.attached_to), Some(plane_id));
    }

    #[test]
    fn test_remove_requires_tracked_anchor() {
        let mut anchors = registry();
        let anchor = anchors.try_add_anchor(Pose::identity()).unwrap();

        // Not reconciled yet
        assert!(!anchors.try_remove_anchor(anchor.id));
        anchors.reconcile();

        assert!(anchors.try_remove_anchor(anchor.id));
        let changes = anchors.reconcile();
        assert_eq!(changes.removed, vec![anchor.id]);
        assert_eq!(anchors.tracked_count(), 0);
    }

    #[test]
    fn test_invalid_requests_create_nothing() {
        let mut anchors = registry();
        let bad_pose = Pose::from_position(Vector3::new(f64::NAN, 0.0, 0.0));

        assert!(anchors.try_add_anchor(bad_pose).is_none());
        assert!(anchors
            .try_attach_anchor(TrackableId::INVALID, Pose::identity())
            .is_none());
        assert!(anchors
            .try_attach_anchor(TrackableId::new(7, 7), bad_pose)
            .is_none());

        assert!(anchors.pending().is_empty());
        assert!(anchors.reconcile().is_empty());
    }

    #[test]
    fn test_anchor_ids_are_distinct() {
        let mut anchors = registry();
        let a = anchors.try_add_anchor(Pose::identity()).unwrap();
        let b = anchors.try_add_anchor(Pose::identity()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(anchors.reconcile().added.len(), 2);
    }
}
