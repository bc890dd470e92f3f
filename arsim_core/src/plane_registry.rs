//! Plane registry: the generic reconcile protocol plus an overlap/merge pre-pass.
//!
//! Before pending operations are applied, every newly added plane that allows merging
//! is matched against planes it lies coplanar with and overlaps. The first match wins:
//! tracked planes are searched first (in id order), then planes added earlier in the
//! same cycle (in registration order). The newcomer is folded into the match and
//! disappears from the pending adds.

use crate::geometry::DEFAULT_COPLANAR_EPSILON;
use crate::plane::{merge_planes, BoundedPlane, PlaneData};
use crate::registry::{
    replace_or_push, ChangeSet, PendingBucket, PendingChanges, RegistryConfig, Trackable,
    TrackableRegistry,
};
use crate::types::{PlanePoint, TrackableId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

impl Trackable for PlaneData {
    const KIND: &'static str = "plane";

    fn trackable_id(&self) -> TrackableId {
        self.id()
    }
}

/// Settings for the overlap/merge pre-pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneMergeConfig {
    /// Run the merge pre-pass at all (default: true)
    pub enabled: bool,

    /// Max difference in local height for two planes to count as coplanar (default: 0.1)
    pub coplanar_epsilon: f64,
}

impl Default for PlaneMergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            coplanar_epsilon: DEFAULT_COPLANAR_EPSILON,
        }
    }
}

/// Where a newly added plane was folded.
enum MergeTarget {
    Tracked(TrackableId),
    Added(usize),
}

#[derive(Debug, Clone, Default)]
pub struct PlaneRegistry {
    inner: TrackableRegistry<PlaneData>,
    merge: PlaneMergeConfig,
}

impl PlaneRegistry {
    pub fn new(config: RegistryConfig, merge: PlaneMergeConfig) -> Self {
        Self {
            inner: TrackableRegistry::new(config),
            merge,
        }
    }

    pub fn merge_config(&self) -> &PlaneMergeConfig {
        &self.merge
    }

    pub fn register(&mut self, plane: PlaneData) {
        self.inner.register(plane);
    }

    pub fn update(&mut self, plane: PlaneData) {
        self.inner.update(plane);
    }

    pub fn unregister(&mut self, id: TrackableId) {
        self.inner.unregister(id);
    }

    /// Runs the merge pre-pass, then the generic reconcile.
    pub fn reconcile(&mut self) -> ChangeSet<PlaneData> {
        if self.merge.enabled {
            self.resolve_overlaps();
        }
        self.inner.reconcile()
    }

    /// Current boundary of a tracked plane. A miss is a stale query and is logged.
    pub fn boundary(&self, id: TrackableId) -> Option<&[PlanePoint]> {
        match self.inner.get(id) {
            Some(plane) => Some(plane.bounds()),
            None => {
                warn!("Boundary requested for untracked plane {}", id);
                None
            }
        }
    }

    pub fn is_tracked(&self, id: TrackableId) -> bool {
        self.inner.is_tracked(id)
    }

    pub fn get(&self, id: TrackableId) -> Option<&PlaneData> {
        self.inner.get(id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &PlaneData> {
        self.inner.tracked()
    }

    /// Host-facing plane records of everything tracked.
    pub fn tracked_planes(&self) -> impl Iterator<Item = &BoundedPlane> {
        self.inner.tracked().map(|p| &p.plane)
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.tracked_count()
    }

    pub fn pending(&self) -> &PendingChanges<PlaneData> {
        self.inner.pending()
    }

    /// Pending bucket of `id`, for invariant checks.
    pub fn pending_bucket_of(&self, id: TrackableId) -> Option<PendingBucket> {
        self.inner.pending.bucket_of(id)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    // ========================================================================
    // MERGE PRE-PASS
    // ========================================================================

    fn resolve_overlaps(&mut self) {
        let candidates = std::mem::take(&mut self.inner.pending.added);
        let candidate_ids: Vec<TrackableId> = candidates.iter().map(PlaneData::id).collect();
        let mut accepted: Vec<PlaneData> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let id = candidate.id();
            let eligible = candidate.allow_merging && candidate.has_bounds();
            if !eligible || self.inner.is_tracked(id) {
                accepted.push(candidate);
                continue;
            }

            let target = self
                .find_tracked_target(&candidate, &candidate_ids)
                .map(MergeTarget::Tracked)
                .or_else(|| self.find_added_target(&candidate, &accepted).map(MergeTarget::Added));

            match target {
                Some(MergeTarget::Tracked(target_id)) => {
                    let base = self.effective_tracked(target_id);
                    match base.map(|b| merge_planes(b, &candidate)) {
                        Some(Ok(merged)) => {
                            debug!("Merged plane {} into tracked plane {}", id, target_id);
                            replace_or_push(&mut self.inner.pending.updated, merged);
                        }
                        Some(Err(e)) => {
                            warn!("Failed to merge plane {} into {}: {}", id, target_id, e);
                            accepted.push(candidate);
                        }
                        None => accepted.push(candidate),
                    }
                }
                Some(MergeTarget::Added(index)) => {
                    let target_id = accepted[index].id();
                    match merge_planes(&accepted[index], &candidate) {
                        Ok(merged) => {
                            debug!("Merged plane {} into newly added plane {}", id, target_id);
                            accepted[index] = merged;
                        }
                        Err(e) => {
                            warn!("Failed to merge plane {} into {}: {}", id, target_id, e);
                            accepted.push(candidate);
                        }
                    }
                }
                None => accepted.push(candidate),
            }
        }

        self.inner.pending.added = accepted;
    }

    /// Latest known state of a tracked plane: its pending update if queued, else the stored one.
    fn effective_tracked(&self, id: TrackableId) -> Option<&PlaneData> {
        self.inner
            .pending
            .updated
            .iter()
            .find(|p| p.id() == id)
            .or_else(|| self.inner.get(id))
    }

    fn find_tracked_target(
        &self,
        candidate: &PlaneData,
        candidate_ids: &[TrackableId],
    ) -> Option<TrackableId> {
        let removed = &self.inner.pending.removed;
        self.inner
            .tracked_ids()
            // A tracked plane re-added or pending removal is left alone this cycle
            .filter(|tid| !removed.contains(tid) && !candidate_ids.contains(tid))
            .find(|tid| {
                self.effective_tracked(*tid)
                    .is_some_and(|existing| self.should_merge(existing, candidate))
            })
    }

    fn find_added_target(&self, candidate: &PlaneData, accepted: &[PlaneData]) -> Option<usize> {
        accepted.iter().position(|existing| {
            existing.id() != candidate.id()
                && !self.inner.is_tracked(existing.id())
                && self.should_merge(existing, candidate)
        })
    }

    fn should_merge(&self, existing: &PlaneData, candidate: &PlaneData) -> bool {
        existing.can_merge_with(candidate)
            && existing.is_on_one_plane(candidate, self.merge.coplanar_epsilon)
            && existing.overlaps(candidate)
    }
}

// ============================================================================
// TESTS
// ============================================================================
