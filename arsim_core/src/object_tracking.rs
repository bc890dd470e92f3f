//! Tracked 3D objects, resolved against a reference object library.

use crate::reference::{LibraryBound, LibraryRegistry, ReferenceEntry};
use crate::registry::Trackable;
use crate::types::{Pose, TrackableId, TrackingState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: TrackableId,
    pub pose: Pose,

    /// Guid of the reference object the producer represents.
    pub reference_guid: Uuid,

    /// Guid of the matched library entry. Nil until resolved.
    pub reference_object_id: Uuid,

    pub tracking_state: TrackingState,
}

impl TrackedObject {
    pub fn new(id: TrackableId, pose: Pose, reference_guid: Uuid) -> Self {
        Self {
            id,
            pose,
            reference_guid,
            reference_object_id: Uuid::nil(),
            tracking_state: TrackingState::Tracking,
        }
    }
}

impl Trackable for TrackedObject {
    const KIND: &'static str = "object";

    fn trackable_id(&self) -> TrackableId {
        self.id
    }
}

impl LibraryBound for TrackedObject {
    fn library_key(&self) -> Uuid {
        self.reference_guid
    }

    fn bind(&mut self, entry: &ReferenceEntry) {
        self.reference_object_id = entry.guid;
    }

    fn pose_mut(&mut self) -> &mut Pose {
        &mut self.pose
    }
}

pub type ObjectTrackingRegistry = LibraryRegistry<TrackedObject>;
