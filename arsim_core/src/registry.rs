//! The change-set reconciliation registry shared by every trackable kind.
//!
//! Producers queue `register` / `update` / `unregister` calls at any point during a
//! tick. Once per polling cycle the consumer calls `reconcile`, which applies the
//! queued operations to the persistent tracked set and returns what actually changed:
//!
//! 1. Updated entries for ids that are not tracked are dropped.
//! 2. Added entries for ids that are already tracked are dropped.
//! 3. Removed ids that are not tracked are dropped.
//! 4. All three pending buckets are cleared, including dropped entries.
//!
//! An id is in at most one pending bucket at any time. Every mutation re-routes an id
//! out of the bucket it was in before inserting it into its new one.

use crate::types::TrackableId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration shared by every registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Log a warning when an update for an untracked id is dropped (default: true)
    pub warn_on_stale_update: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            warn_on_stale_update: true,
        }
    }
}

// ============================================================================
// TRACKABLE
// ============================================================================

/// An entity the registry can track: anything that knows its own id.
pub trait Trackable: Clone {
    /// Short name of the kind, used in log lines.
    const KIND: &'static str;

    fn trackable_id(&self) -> TrackableId;
}

// ============================================================================
// PENDING / CHANGE SET
// ============================================================================

/// Which pending bucket an id currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingBucket {
    Added,
    Updated,
    Removed,
}

/// Operations queued since the last reconcile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChanges<T> {
    pub added: Vec<T>,
    pub updated: Vec<T>,
    pub removed: Vec<TrackableId>,
}

impl<T> Default for PendingChanges<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T: Trackable> PendingChanges<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// The bucket `id` is pending in, if any.
    pub fn bucket_of(&self, id: TrackableId) -> Option<PendingBucket> {
        if self.added.iter().any(|t| t.trackable_id() == id) {
            Some(PendingBucket::Added)
        } else if self.updated.iter().any(|t| t.trackable_id() == id) {
            Some(PendingBucket::Updated)
        } else if self.removed.contains(&id) {
            Some(PendingBucket::Removed)
        } else {
            None
        }
    }

    /// Number of pending slots naming `id`, summed across all buckets.
    pub fn occurrences(&self, id: TrackableId) -> usize {
        self.added.iter().filter(|t| t.trackable_id() == id).count()
            + self.updated.iter().filter(|t| t.trackable_id() == id).count()
            + self.removed.iter().filter(|r| **r == id).count()
    }

    fn clear(&mut self) {
        self.added.clear();
        self.updated.clear();
        self.removed.clear();
    }
}

/// Replaces the entry with the same id in place, or appends.
pub(crate) fn replace_or_push<T: Trackable>(list: &mut Vec<T>, item: T) {
    let id = item.trackable_id();
    match list.iter_mut().find(|t| t.trackable_id() == id) {
        Some(slot) => *slot = item,
        None => list.push(item),
    }
}

/// Removes the entry with `id` from `list`, returning it.
pub(crate) fn take_by_id<T: Trackable>(list: &mut Vec<T>, id: TrackableId) -> Option<T> {
    let index = list.iter().position(|t| t.trackable_id() == id)?;
    Some(list.remove(index))
}

/// The diff returned by one reconcile: what was truly added, changed and removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet<T> {
    pub added: Vec<T>,
    pub updated: Vec<T>,
    pub removed: Vec<TrackableId>,
}

impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> ChangeSet<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

impl<T: Trackable> ChangeSet<T> {
    pub fn added_ids(&self) -> impl Iterator<Item = TrackableId> + '_ {
        self.added.iter().map(Trackable::trackable_id)
    }

    pub fn updated_ids(&self) -> impl Iterator<Item = TrackableId> + '_ {
        self.updated.iter().map(Trackable::trackable_id)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Pending buckets plus the persistent tracked set for one trackable kind.
#[derive(Debug, Clone)]
pub struct TrackableRegistry<T: Trackable> {
    pub(crate) config: RegistryConfig,
    pub(crate) pending: PendingChanges<T>,
    pub(crate) tracked: BTreeMap<TrackableId, T>,
}

impl<T: Trackable> Default for TrackableRegistry<T> {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl<T: Trackable> TrackableRegistry<T> {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            pending: PendingChanges::default(),
            tracked: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Queues `item` as added. Cancels any pending update or removal of the same id.
    pub fn register(&mut self, item: T) {
        let id = item.trackable_id();
        take_by_id(&mut self.pending.updated, id);
        self.pending.removed.retain(|r| *r != id);
        replace_or_push(&mut self.pending.added, item);
    }

    /// Queues `item` as updated if it is tracked, refreshes it in place if it is pending
    /// as added, and otherwise treats it as a registration.
    pub fn update(&mut self, item: T) {
        let id = item.trackable_id();
        self.pending.removed.retain(|r| *r != id);

        if let Some(slot) = self.pending.added.iter_mut().find(|t| t.trackable_id() == id) {
            *slot = item;
        } else if self.tracked.contains_key(&id) {
            replace_or_push(&mut self.pending.updated, item);
        } else {
            self.register(item);
        }
    }

    /// Queues `id` for removal, evicting any pending add or update.
    pub fn unregister(&mut self, id: TrackableId) {
        take_by_id(&mut self.pending.added, id);
        take_by_id(&mut self.pending.updated, id);
        if !self.pending.removed.contains(&id) {
            self.pending.removed.push(id);
        }
    }

    /// Applies the pending operations to the tracked set and returns the effective diff.
    pub fn reconcile(&mut self) -> ChangeSet<T> {
        let pending = std::mem::take(&mut self.pending);
        let mut changes = ChangeSet::default();

        for item in pending.updated {
            let id = item.trackable_id();
            match self.tracked.get_mut(&id) {
                Some(slot) => {
                    *slot = item.clone();
                    changes.updated.push(item);
                }
                None => {
                    if self.config.warn_on_stale_update {
                        warn!("Dropping update for untracked {} {}", T::KIND, id);
                    }
                }
            }
        }

        for item in pending.added {
            let id = item.trackable_id();
            if self.tracked.contains_key(&id) {
                trace!("Dropping duplicate add of {} {}", T::KIND, id);
                continue;
            }
            self.tracked.insert(id, item.clone());
            changes.added.push(item);
        }

        for id in pending.removed {
            if self.tracked.remove(&id).is_some() {
                changes.removed.push(id);
            } else {
                trace!("Dropping removal of untracked {} {}", T::KIND, id);
            }
        }

        if !changes.is_empty() {
            debug!(
                "Reconciled {}: {} added, {} updated, {} removed ({} tracked)",
                T::KIND,
                changes.added.len(),
                changes.updated.len(),
                changes.removed.len(),
                self.tracked.len()
            );
        }

        changes
    }

    pub fn is_tracked(&self, id: TrackableId) -> bool {
        self.tracked.contains_key(&id)
    }

    pub fn get(&self, id: TrackableId) -> Option<&T> {
        self.tracked.get(&id)
    }

    /// Tracked entities in id order.
    pub fn tracked(&self) -> impl Iterator<Item = &T> {
        self.tracked.values()
    }

    pub fn tracked_ids(&self) -> impl Iterator<Item = TrackableId> + '_ {
        self.tracked.keys().copied()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn pending(&self) -> &PendingChanges<T> {
        &self.pending
    }

    /// Drops every pending operation and every tracked entity.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.tracked.clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================
