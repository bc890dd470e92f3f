//! Tracked images, resolved against a reference image library.

use crate::reference::{LibraryBound, LibraryRegistry, ReferenceEntry};
use crate::registry::Trackable;
use crate::types::{PlaneVector, Pose, TrackableId, TrackingState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedImage {
    pub id: TrackableId,
    pub pose: Pose,

    /// Guid of the texture the producer is showing.
    pub texture_guid: Uuid,

    /// Guid of the matched reference entry. Nil until resolved.
    pub source_image_id: Uuid,

    /// Physical size. Taken from the library when the producer gives none.
    pub size: Option<PlaneVector>,

    pub tracking_state: TrackingState,
}

impl TrackedImage {
    pub fn new(id: TrackableId, pose: Pose, texture_guid: Uuid) -> Self {
        Self {
            id,
            pose,
            texture_guid,
            source_image_id: Uuid::nil(),
            size: None,
            tracking_state: TrackingState::Tracking,
        }
    }

    pub fn with_size(mut self, size: PlaneVector) -> Self {
        self.size = Some(size);
        self
    }
}

impl Trackable for TrackedImage {
    const KIND: &'static str = "image";

    fn trackable_id(&self) -> TrackableId {
        self.id
    }
}

impl LibraryBound for TrackedImage {
    fn library_key(&self) -> Uuid {
        self.texture_guid
    }

    fn bind(&mut self, entry: &ReferenceEntry) {
        self.source_image_id = entry.guid;
        if self.size.is_none() {
            self.size = entry.size;
        }
    }

    fn pose_mut(&mut self) -> &mut Pose {
        &mut self.pose
    }
}

pub type ImageTrackingRegistry = LibraryRegistry<TrackedImage>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceLibrary;
    use crate::registry::RegistryConfig;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const POSTER: Uuid = Uuid::from_u128(0x10);
    const POSTER_TEXTURE: Uuid = Uuid::from_u128(0x11);

    fn registry() -> ImageTrackingRegistry {
        let library = ReferenceLibrary::new(vec![ReferenceEntry::new(POSTER, "poster")
            .with_texture(POSTER_TEXTURE)
            .with_size(PlaneVector::new(0.3, 0.2))]);
        ImageTrackingRegistry::new(RegistryConfig::default(), library)
    }

    #[test]
    fn test_known_image_is_bound_to_library_entry() {
        let mut images = registry();
        let id = TrackableId::new(1, 1);
        images.register(TrackedImage::new(id, Pose::identity(), POSTER_TEXTURE));

        let changes = images.reconcile();
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].source_image_id, POSTER);
        assert_eq!(changes.added[0].size, Some(PlaneVector::new(0.3, 0.2)));
        assert!(images.is_tracked(id));
    }

    #[test]
    fn test_explicit_size_wins_over_library() {
        let mut images = registry();
        let id = TrackableId::new(1, 1);
        images.register(
            TrackedImage::new(id, Pose::identity(), POSTER_TEXTURE)
                .with_size(PlaneVector::new(1.0, 1.0)),
        );

        let changes = images.reconcile();
        assert_eq!(changes.added[0].size, Some(PlaneVector::new(1.0, 1.0)));
    }

    #[test]
    fn test_unknown_image_is_dropped() {
        let mut images = registry();
        let id = TrackableId::new(2, 2);
        images.register(TrackedImage::new(id, Pose::identity(), Uuid::from_u128(0x99)));

        assert!(images.reconcile().is_empty());
        assert!(!images.is_tracked(id));
        assert!(images.pending().is_empty());
    }

    #[test]
    fn test_update_is_reframed_into_session_space() {
        let mut images = registry();
        images.set_session_origin(Some(Pose::from_position(Vector3::new(0.0, 1.0, 0.0))));
        let id = TrackableId::new(1, 1);
        images.register(TrackedImage::new(id, Pose::identity(), POSTER_TEXTURE));
        images.reconcile();

        images.update(TrackedImage::new(
            id,
            Pose::from_position(Vector3::new(2.0, 1.0, 0.0)),
            POSTER_TEXTURE,
        ));
        let changes = images.reconcile();
        assert_eq!(changes.updated.len(), 1);
        assert_relative_eq!(
            changes.updated[0].pose.position,
            Vector3::new(2.0, 0.0, 0.0),
            epsilon = 1e-12
        );
    }
}
