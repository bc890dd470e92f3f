//! SimWorld - the simulation harness container.
//!
//! Owns one session plus its oracle and shadow model, and checks the reconcile
//! invariants around every poll:
//! - before: no id sits in two pending buckets
//! - after: every pending bucket is drained
//! - the diff lists each id at most once, adds only untracked ids, and updates
//!   or removes only ids tracked before the poll

use crate::error::SimError;
use crate::exporter::{SimExport, SimFrame};
use crate::oracle::{Oracle, ShadowModel, TrackableKind};
use arsim_core::{
    ChangeSet, PendingChanges, SessionChanges, SessionConfig, SimulationSession, Trackable,
    TrackableId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of polls per scenario
    pub ticks: u64,

    /// Producer operations per tick (churn) or number of scanned patches (floor scan)
    pub producers: usize,

    /// Probability that a churn operation is a removal
    pub churn_probability: f64,

    /// Position noise standard deviation for sampled points
    pub sensor_noise_std: f64,

    pub session: SessionConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks: 60,
            producers: 8,
            churn_probability: 0.3,
            sensor_noise_std: 0.01,
            session: SessionConfig::default(),
        }
    }
}

impl SimConfig {
    /// Loads a config from JSON. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Producer calls issued (register, update, unregister, anchor API)
    pub mutations: u64,

    pub polls: u64,
    pub added: u64,
    pub updated: u64,
    pub removed: u64,

    /// Polls and shadow comparisons that passed every invariant
    pub invariant_checks: u64,
}

pub type TrackedSnapshot = BTreeMap<TrackableKind, BTreeSet<TrackableId>>;

/// The SimWorld - container for one simulated session.
pub struct SimWorld {
    pub config: SimConfig,
    pub session: SimulationSession,
    pub oracle: Oracle,
    pub shadow: ShadowModel,
    pub metrics: ScenarioMetrics,
    export: Option<SimExport>,
    tick_count: u64,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        // Derive separate seeds for ids and synthetic data
        let id_seed = config.seed.wrapping_mul(0x517cc1b727220a95);
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let mut session_config = config.session.clone();
        session_config.id_seed = session_config.id_seed.or(Some(id_seed));

        let mut oracle = Oracle::new(physics_seed);
        oracle.set_position_noise(config.sensor_noise_std);

        Self {
            session: SimulationSession::new(session_config),
            oracle,
            shadow: ShadowModel::new(),
            metrics: ScenarioMetrics::default(),
            export: None,
            tick_count: 0,
            config,
        }
    }

    /// Records a frame per poll from now on.
    pub fn enable_export(&mut self, scenario: &str) {
        self.export = Some(SimExport::new(scenario, self.config.seed));
    }

    pub fn take_export(&mut self) -> Option<SimExport> {
        self.export.take()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Polls the session and checks the reconcile invariants around it.
    pub fn poll(&mut self) -> Result<SessionChanges, SimError> {
        let tick = self.tick_count;
        self.check_pending_exclusive()?;

        let before = self.snapshot();
        let changes = self.session.poll();
        self.tick_count += 1;

        self.check_drained()?;
        let s = &self.session;
        check_diff(tick, TrackableKind::Plane, &changes.planes, &before)?;
        check_diff(tick, TrackableKind::PointCloud, &changes.point_clouds, &before)?;
        check_diff(tick, TrackableKind::Anchor, &changes.anchors, &before)?;
        check_diff(tick, TrackableKind::Image, &changes.images, &before)?;
        check_diff(tick, TrackableKind::Object, &changes.objects, &before)?;
        check_diff(tick, TrackableKind::Probe, &changes.probes, &before)?;
        self.metrics.invariant_checks += 1;

        self.metrics.polls += 1;
        self.metrics.added += count(&changes, |c| c.0) as u64;
        self.metrics.updated += count(&changes, |c| c.1) as u64;
        self.metrics.removed += count(&changes, |c| c.2) as u64;

        if let Some(export) = &mut self.export {
            export.add_frame(SimFrame::capture(tick, &changes, s));
        }

        if tick % 30 == 0 {
            debug!(
                "  tick={} | changes={} | tracked={}",
                tick,
                changes.len(),
                s.tracked_count()
            );
        }

        Ok(changes)
    }

    /// Tracked ids of every kind.
    pub fn snapshot(&self) -> TrackedSnapshot {
        let s = &self.session;
        let mut snapshot = TrackedSnapshot::new();
        snapshot.insert(TrackableKind::Plane, s.planes.tracked().map(|p| p.id()).collect());
        snapshot.insert(
            TrackableKind::PointCloud,
            s.point_clouds.tracked().map(|c| c.id).collect(),
        );
        snapshot.insert(TrackableKind::Anchor, s.anchors.tracked().map(|a| a.id).collect());
        snapshot.insert(TrackableKind::Image, s.images.tracked().map(|i| i.id).collect());
        snapshot.insert(TrackableKind::Object, s.objects.tracked().map(|o| o.id).collect());
        snapshot.insert(TrackableKind::Probe, s.probes.tracked_ids().collect());
        snapshot
    }

    /// Compares the session's tracked ids with the shadow model.
    pub fn check_shadow(&mut self) -> Result<(), SimError> {
        let snapshot = self.snapshot();
        for kind in TrackableKind::ALL {
            let expected = self.shadow.expected(kind);
            let actual = snapshot.get(&kind).cloned().unwrap_or_default();
            if expected != actual {
                return Err(SimError::invariant(
                    self.tick_count,
                    format!(
                        "{} tracked set diverged: expected {} ids, session has {}",
                        kind.name(),
                        expected.len(),
                        actual.len()
                    ),
                ));
            }
        }
        self.metrics.invariant_checks += 1;
        Ok(())
    }

    fn check_pending_exclusive(&self) -> Result<(), SimError> {
        let s = &self.session;
        let tick = self.tick_count;
        check_exclusive(tick, TrackableKind::Plane, s.planes.pending())?;
        check_exclusive(tick, TrackableKind::PointCloud, s.point_clouds.pending())?;
        check_exclusive(tick, TrackableKind::Anchor, s.anchors.pending())?;
        check_exclusive(tick, TrackableKind::Image, s.images.pending())?;
        check_exclusive(tick, TrackableKind::Object, s.objects.pending())?;
        check_exclusive(tick, TrackableKind::Probe, s.probes.pending())
    }

    fn check_drained(&self) -> Result<(), SimError> {
        let s = &self.session;
        let drained = s.planes.pending().is_empty()
            && s.point_clouds.pending().is_empty()
            && s.anchors.pending().is_empty()
            && s.images.pending().is_empty()
            && s.objects.pending().is_empty()
            && s.probes.pending().is_empty();
        if drained {
            Ok(())
        } else {
            Err(SimError::invariant(self.tick_count, "pending buckets not drained by poll"))
        }
    }
}

fn count(changes: &SessionChanges, pick: impl Fn((usize, usize, usize)) -> usize) -> usize {
    fn sizes<T>(c: &ChangeSet<T>) -> (usize, usize, usize) {
        (c.added.len(), c.updated.len(), c.removed.len())
    }
    pick(sizes(&changes.planes))
        + pick(sizes(&changes.point_clouds))
        + pick(sizes(&changes.anchors))
        + pick(sizes(&changes.images))
        + pick(sizes(&changes.objects))
        + pick(sizes(&changes.probes))
}

fn check_exclusive<T: Trackable>(
    tick: u64,
    kind: TrackableKind,
    pending: &PendingChanges<T>,
) -> Result<(), SimError> {
    let mut ids: Vec<TrackableId> = pending.added.iter().map(Trackable::trackable_id).collect();
    ids.extend(pending.updated.iter().map(Trackable::trackable_id));
    ids.extend(pending.removed.iter().copied());

    let total = ids.len();
    ids.sort();
    ids.dedup();
    if ids.len() == total {
        Ok(())
    } else {
        Err(SimError::invariant(
            tick,
            format!("{} id pending in more than one slot", kind.name()),
        ))
    }
}

fn check_diff<T: Trackable>(
    tick: u64,
    kind: TrackableKind,
    changes: &ChangeSet<T>,
    before: &TrackedSnapshot,
) -> Result<(), SimError> {
    let empty = BTreeSet::new();
    let tracked_before = before.get(&kind).unwrap_or(&empty);
    let mut seen = BTreeSet::new();

    for id in changes.added_ids() {
        if tracked_before.contains(&id) {
            return Err(SimError::invariant(tick, format!("{} {} added twice", kind.name(), id)));
        }
        if !seen.insert(id) {
            return Err(SimError::invariant(tick, format!("{} {} listed twice", kind.name(), id)));
        }
    }
    for id in changes.updated_ids().chain(changes.removed.iter().copied()) {
        if !tracked_before.contains(&id) {
            return Err(SimError::invariant(
                tick,
                format!("{} {} changed without being tracked", kind.name(), id),
            ));
        }
        if !seen.insert(id) {
            return Err(SimError::invariant(tick, format!("{} {} listed twice", kind.name(), id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_config_from_partial_json() {
        let config: SimConfig = serde_json::from_str(r#"{ "seed": 7, "ticks": 5 }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.ticks, 5);
        assert_eq!(config.producers, SimConfig::default().producers);
        assert!(config.session.plane_merge.enabled);
    }

    #[test]
    fn test_poll_counts_changes() {
        let mut world = SimWorld::new(SimConfig::default());
        let plane = world
            .oracle
            .square_plane(TrackableId::new(1, 0), Vector3::zeros(), 1.0, true);
        world.session.planes.register(plane);

        let changes = world.poll().unwrap();
        assert_eq!(changes.planes.added.len(), 1);
        assert_eq!(world.metrics.polls, 1);
        assert_eq!(world.metrics.added, 1);
        assert_eq!(world.tick_count(), 1);
    }

    #[test]
    fn test_shadow_mismatch_is_reported() {
        let mut world = SimWorld::new(SimConfig::default());
        world
            .shadow
            .record(TrackableKind::Probe, TrackableId::new(1, 0), crate::oracle::ShadowOp::Present);
        world.shadow.apply();
        world.poll().unwrap();

        assert!(matches!(world.check_shadow(), Err(SimError::Invariant { .. })));
    }

    #[test]
    fn test_export_records_frames() {
        let mut world = SimWorld::new(SimConfig::default());
        world.enable_export("plane_merge");
        world.poll().unwrap();
        world.poll().unwrap();

        let export = world.take_export().unwrap();
        assert_eq!(export.frames.len(), 2);
        assert_eq!(export.frames[1].tick, 1);
    }
}
