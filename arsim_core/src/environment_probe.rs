//! Environment probes. These use the generic registry as is.

use crate::registry::{Trackable, TrackableRegistry};
use crate::types::{Pose, TrackableId, TrackingState};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentProbe {
    pub id: TrackableId,
    pub pose: Pose,
    pub scale: Vector3<f64>,

    /// Extent of the captured volume.
    pub size: Vector3<f64>,

    pub tracking_state: TrackingState,
}

impl EnvironmentProbe {
    pub fn new(id: TrackableId, pose: Pose, size: Vector3<f64>) -> Self {
        Self {
            id,
            pose,
            scale: Vector3::new(1.0, 1.0, 1.0),
            size,
            tracking_state: TrackingState::Tracking,
        }
    }
}

impl Trackable for EnvironmentProbe {
    const KIND: &'static str = "environment probe";

    fn trackable_id(&self) -> TrackableId {
        self.id
    }
}

pub type EnvironmentProbeRegistry = TrackableRegistry<EnvironmentProbe>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_life_cycle() {
        let mut probes = EnvironmentProbeRegistry::default();
        let id = TrackableId::new(3, 3);
        let probe = EnvironmentProbe::new(id, Pose::identity(), Vector3::new(2.0, 2.0, 2.0));

        probes.register(probe);
        assert_eq!(probes.reconcile().added, vec![probe]);

        let mut moved = probe;
        moved.scale = Vector3::new(2.0, 2.0, 2.0);
        probes.update(moved);
        assert_eq!(probes.reconcile().updated, vec![moved]);

        probes.unregister(id);
        assert_eq!(probes.reconcile().removed, vec![id]);
        assert_eq!(probes.tracked_count(), 0);
    }
}
