//! Reference libraries and the library-resolving registry used by tracked images and objects.
//!
//! Producers name the reference they are showing by guid. At reconcile time each pending
//! add or update is looked up in the library: unresolved entries are dropped with a warning
//! and never become tracked, resolved entries get the library data bound into them.

use crate::registry::{ChangeSet, PendingChanges, RegistryConfig, Trackable, TrackableRegistry};
use crate::types::{PlaneVector, Pose, TrackableId};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// LIBRARY
// ============================================================================

/// One reference image or object the session is able to detect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub guid: Uuid,
    pub name: String,

    /// Guid of the source texture, for image references.
    pub texture_guid: Option<Uuid>,

    /// Physical size in metres, if known.
    pub size: Option<PlaneVector>,
}

impl ReferenceEntry {
    pub fn new(guid: Uuid, name: impl Into<String>) -> Self {
        Self {
            guid,
            name: name.into(),
            texture_guid: None,
            size: None,
        }
    }

    pub fn with_texture(mut self, texture_guid: Uuid) -> Self {
        self.texture_guid = Some(texture_guid);
        self
    }

    pub fn with_size(mut self, size: PlaneVector) -> Self {
        self.size = Some(size);
        self
    }

    /// True if `key` names this entry or its texture.
    pub fn matches(&self, key: Uuid) -> bool {
        self.guid == key || self.texture_guid == Some(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLibrary {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceLibrary {
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self { entries }
    }

    pub fn add(&mut self, entry: ReferenceEntry) {
        self.entries.push(entry);
    }

    /// First entry whose guid or texture guid equals `key`.
    pub fn find(&self, key: Uuid) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|e| e.matches(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// LIBRARY-BOUND TRACKABLES
// ============================================================================

/// A trackable that must be resolved against a reference library before it is tracked.
pub trait LibraryBound: Trackable {
    /// Guid the producer used to name the reference.
    fn library_key(&self) -> Uuid;

    /// Copies the resolved entry's data into the record.
    fn bind(&mut self, entry: &ReferenceEntry);

    fn pose_mut(&mut self) -> &mut Pose;
}

/// Registry whose reconcile first resolves pending entries against a [`ReferenceLibrary`].
///
/// With a session origin set, resolved poses are re-expressed relative to it.
#[derive(Debug, Clone)]
pub struct LibraryRegistry<T: LibraryBound> {
    inner: TrackableRegistry<T>,
    library: ReferenceLibrary,
    session_origin: Option<Pose>,
}

impl<T: LibraryBound> Default for LibraryRegistry<T> {
    fn default() -> Self {
        Self::new(RegistryConfig::default(), ReferenceLibrary::default())
    }
}

impl<T: LibraryBound> LibraryRegistry<T> {
    pub fn new(config: RegistryConfig, library: ReferenceLibrary) -> Self {
        Self {
            inner: TrackableRegistry::new(config),
            library,
            session_origin: None,
        }
    }

    pub fn library(&self) -> &ReferenceLibrary {
        &self.library
    }

    pub fn set_library(&mut self, library: ReferenceLibrary) {
        self.library = library;
    }

    pub fn set_session_origin(&mut self, origin: Option<Pose>) {
        self.session_origin = origin;
    }

    pub fn register(&mut self, item: T) {
        self.inner.register(item);
    }

    pub fn update(&mut self, item: T) {
        self.inner.update(item);
    }

    pub fn unregister(&mut self, id: TrackableId) {
        self.inner.unregister(id);
    }

    pub fn reconcile(&mut self) -> ChangeSet<T> {
        let added = std::mem::take(&mut self.inner.pending.added);
        self.inner.pending.added = self.resolve(added);
        let updated = std::mem::take(&mut self.inner.pending.updated);
        self.inner.pending.updated = self.resolve(updated);
        self.inner.reconcile()
    }

    fn resolve(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .filter_map(|mut item| {
                let Some(entry) = self.library.find(item.library_key()) else {
                    warn!(
                        "{} {} not found in reference library (key {})",
                        T::KIND,
                        item.trackable_id(),
                        item.library_key()
                    );
                    return None;
                };
                item.bind(entry);
                if let Some(origin) = &self.session_origin {
                    let pose = item.pose_mut();
                    *pose = pose.relative_to(origin);
                }
                Some(item)
            })
            .collect()
    }

    pub fn is_tracked(&self, id: TrackableId) -> bool {
        self.inner.is_tracked(id)
    }

    pub fn get(&self, id: TrackableId) -> Option<&T> {
        self.inner.get(id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &T> {
        self.inner.tracked()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.tracked_count()
    }

    pub fn pending(&self) -> &PendingChanges<T> {
        self.inner.pending()
    }

    /// Drops pending and tracked entries. The library is kept.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_guid_or_texture() {
        let guid = Uuid::from_u128(1);
        let texture = Uuid::from_u128(2);
        let library = ReferenceLibrary::new(vec![
            ReferenceEntry::new(Uuid::from_u128(9), "other"),
            ReferenceEntry::new(guid, "poster").with_texture(texture),
        ]);

        assert_eq!(library.find(guid).map(|e| e.name.as_str()), Some("poster"));
        assert_eq!(library.find(texture).map(|e| e.guid), Some(guid));
        assert!(library.find(Uuid::from_u128(3)).is_none());
        assert_eq!(library.len(), 2);
    }
}
