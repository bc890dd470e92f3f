//! Scenario runner - drives a session through the harness scenarios.

use crate::error::SimError;
use crate::exporter::SimExport;
use crate::oracle::{ShadowOp, TrackableKind};
use crate::scenarios::ScenarioId;
use crate::world::{ScenarioMetrics, SimConfig, SimWorld};

use arsim_core::plane::DEFAULT_SURFACE_OFFSET;
use arsim_core::{
    Anchor, BoundedPlane, EnvironmentProbe, PlaneClassification, PlaneData, PlanePoint,
    PlaneVector, Pose, ReferenceEntry, ReferenceLibrary, TrackableId, TrackedImage, TrackedObject,
    TrackingState,
};
use nalgebra::Vector3;
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

/// Distance between consecutive floor scan patches (meters)
const PATCH_SPACING: f64 = 1.0;

/// Radius of one floor scan patch (meters)
const PATCH_RADIUS: f64 = 1.0;

/// Random raycast hits per floor scan patch
const PATCH_SAMPLES: usize = 24;

/// Distinct producer ids per kind in the churn scenario
const POOL_SIZE: usize = 6;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total polls executed
    pub total_ticks: u64,

    /// Tracked entities across every kind at the end
    pub final_tracked_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Runs harness scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner with default settings for everything but the seed
    /// and the producer count.
    pub fn new(seed: u64, producers: usize) -> Self {
        Self {
            config: SimConfig {
                seed,
                producers,
                ..SimConfig::default()
            },
        }
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self { config }
    }

    /// Sets the number of polls per scenario.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.config.ticks = ticks;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario and records one frame per poll.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, true);
        let mut export =
            export.unwrap_or_else(|| SimExport::new(scenario.name(), self.config.seed));
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: bool) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let mut world = SimWorld::new(self.config.clone());
        if export {
            world.enable_export(scenario.name());
        }

        let outcome = match scenario {
            ScenarioId::PlaneMerge => self.run_plane_merge(&mut world),
            ScenarioId::FloorScan => self.run_floor_scan(&mut world),
            ScenarioId::Churn => self.run_churn(&mut world),
            ScenarioId::Anchors => self.run_anchors(&mut world),
            ScenarioId::Library => self.run_library(&mut world),
        };

        let (passed, failure_reason) = match outcome {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };

        let result = ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed,
            total_ticks: world.tick_count(),
            final_tracked_count: world.session.tracked_count(),
            failure_reason,
            metrics: world.metrics.clone(),
        };
        (result, world.take_export())
    }

    // ========================================================================
    // PLANE MERGE
    // ========================================================================

    /// Two overlapping coplanar squares registered in the same cycle.
    fn run_plane_merge(&self, world: &mut SimWorld) -> Result<(), SimError> {
        info!("plane_merge: two 2x2 squares 1.5m apart");

        let a_id = TrackableId::new(1, 0);
        let b_id = TrackableId::new(2, 0);
        let a = world.oracle.square_plane(a_id, Vector3::zeros(), 1.0, true);
        let b = world.oracle.square_plane(b_id, Vector3::new(1.5, 0.0, 0.0), 1.0, true);
        world.session.planes.register(a);
        world.session.planes.register(b);
        world.metrics.mutations += 2;

        let changes = world.poll()?;
        let planes = &changes.planes;
        if planes.added.len() != 1 || planes.added[0].id() != a_id {
            return Err(SimError::Check(format!(
                "expected only plane {} added, got {} entries",
                a_id,
                planes.added.len()
            )));
        }
        if !planes.updated.is_empty() || !planes.removed.is_empty() {
            return Err(SimError::Check("merge produced updates or removals".to_string()));
        }

        let (lo, hi) = x_range(planes.added[0].bounds());
        if (lo + 1.0).abs() > 1e-9 || (hi - 2.5).abs() > 1e-9 {
            return Err(SimError::Check(format!(
                "merged hull spans x in [{:.3}, {:.3}], expected [-1, 2.5]",
                lo, hi
            )));
        }
        if world.session.planes.is_tracked(b_id) {
            return Err(SimError::Check("absorbed plane is tracked".to_string()));
        }

        self.idle(world, self.config.ticks.saturating_sub(1).max(1))
    }

    // ========================================================================
    // FLOOR SCAN
    // ========================================================================

    /// One patch of raycast hits per tick along +X, fitted and merged into one floor.
    fn run_floor_scan(&self, world: &mut SimWorld) -> Result<(), SimError> {
        let patches = self.config.producers.max(2);
        let ticks = self.config.ticks.max(patches as u64);
        info!("floor_scan: {} patches over {} ticks", patches, ticks);

        for tick in 0..ticks {
            if (tick as usize) < patches {
                let center = Vector3::new(tick as f64 * PATCH_SPACING, 0.0, 0.0);
                let points = world.oracle.sample_floor_patch(center, PATCH_RADIUS, PATCH_SAMPLES);
                let id = TrackableId::from_handle(TrackableKind::Plane.handle(), tick as i64);

                match BoundedPlane::from_points(id, &points, &Vector3::y(), DEFAULT_SURFACE_OFFSET) {
                    Some((plane, hull)) => {
                        let plane = plane.with_classification(PlaneClassification::Floor);
                        let data = PlaneData::new(plane, Some(hull), true)
                            .map_err(|e| SimError::Check(e.to_string()))?;
                        world.session.planes.register(data);
                        world.metrics.mutations += 1;
                    }
                    None => debug!("  patch {} could not be fitted", tick),
                }
            }
            world.poll()?;
        }

        let planes = &world.session.planes;
        if planes.tracked_count() != 1 {
            return Err(SimError::Check(format!(
                "floor fused into {} planes, expected 1",
                planes.tracked_count()
            )));
        }

        let floor = planes
            .tracked()
            .next()
            .ok_or_else(|| SimError::Check("no floor plane tracked".to_string()))?;
        let (lo, hi) = x_range(floor.bounds());
        let expected_span = (patches - 1) as f64 * PATCH_SPACING;
        if hi - lo < expected_span {
            return Err(SimError::Check(format!(
                "floor spans {:.2}m, expected at least {:.2}m",
                hi - lo,
                expected_span
            )));
        }
        if floor.plane.classification != PlaneClassification::Floor {
            return Err(SimError::Check("floor lost its classification".to_string()));
        }

        info!("✓ floor_scan complete: one floor spanning {:.2}m", hi - lo);
        Ok(())
    }

    // ========================================================================
    // CHURN
    // ========================================================================

    /// Random mutations on every kind, checked against the shadow model after each poll.
    fn run_churn(&self, world: &mut SimWorld) -> Result<(), SimError> {
        info!(
            "churn: {} ops/tick, removal probability {:.2}",
            self.config.producers, self.config.churn_probability
        );

        let (image_keys, object_keys) = self.install_libraries(world, POOL_SIZE);

        for _ in 0..self.config.ticks {
            for _ in 0..self.config.producers {
                self.churn_step(world, &image_keys, &object_keys)?;
                world.metrics.mutations += 1;
            }
            world.poll()?;
            world.shadow.apply();
            world.check_shadow()?;
        }

        info!(
            "✓ churn complete: {} mutations, {} tracked",
            world.metrics.mutations,
            world.session.tracked_count()
        );
        Ok(())
    }

    fn churn_step(
        &self,
        world: &mut SimWorld,
        image_keys: &[Uuid],
        object_keys: &[Uuid],
    ) -> Result<(), SimError> {
        let kind = TrackableKind::ALL[world.oracle.pick(TrackableKind::ALL.len())];
        if kind == TrackableKind::Anchor {
            return self.churn_anchor(world);
        }

        let id = TrackableId::from_handle(kind.handle(), world.oracle.pick(POOL_SIZE) as i64);
        let session = &mut world.session;

        if world.oracle.chance(self.config.churn_probability) {
            match kind {
                TrackableKind::Plane => session.planes.unregister(id),
                TrackableKind::PointCloud => session.point_clouds.unregister(id),
                TrackableKind::Image => session.images.unregister(id),
                TrackableKind::Object => session.objects.unregister(id),
                TrackableKind::Probe => session.probes.unregister(id),
                TrackableKind::Anchor => {}
            }
            world.shadow.record(kind, id, ShadowOp::Absent);
            return Ok(());
        }

        let register = world.oracle.chance(0.5);
        let pose = world.oracle.random_pose(5.0);
        let op = match kind {
            TrackableKind::Plane => {
                let plane = world.oracle.square_plane(id, pose.position, 0.5, false);
                if register {
                    session.planes.register(plane);
                } else {
                    session.planes.update(plane);
                }
                ShadowOp::Present
            }
            TrackableKind::PointCloud => {
                let points = world.oracle.random_points(8, 1.0);
                if register {
                    session.point_clouds.register(id, pose, points);
                } else {
                    session.point_clouds.update(id, pose, points);
                }
                ShadowOp::Present
            }
            TrackableKind::Probe => {
                let probe = EnvironmentProbe::new(id, pose, Vector3::new(1.0, 1.0, 1.0));
                if register {
                    session.probes.register(probe);
                } else {
                    session.probes.update(probe);
                }
                ShadowOp::Present
            }
            TrackableKind::Image => {
                let (key, known) = pick_key(world, image_keys);
                let image = TrackedImage::new(id, pose, key);
                if register {
                    world.session.images.register(image);
                } else {
                    world.session.images.update(image);
                }
                if known {
                    ShadowOp::Present
                } else {
                    ShadowOp::Unchanged
                }
            }
            TrackableKind::Object => {
                let (key, known) = pick_key(world, object_keys);
                let object = TrackedObject::new(id, pose, key);
                if register {
                    world.session.objects.register(object);
                } else {
                    world.session.objects.update(object);
                }
                if known {
                    ShadowOp::Present
                } else {
                    ShadowOp::Unchanged
                }
            }
            TrackableKind::Anchor => ShadowOp::Unchanged,
        };

        world.shadow.record(kind, id, op);
        Ok(())
    }

    fn churn_anchor(&self, world: &mut SimWorld) -> Result<(), SimError> {
        let tracked: Vec<TrackableId> =
            world.shadow.expected(TrackableKind::Anchor).into_iter().collect();
        let pose = world.oracle.random_pose(3.0);

        if !tracked.is_empty() && world.oracle.chance(self.config.churn_probability) {
            let id = tracked[world.oracle.pick(tracked.len())];
            if !world.session.anchors.try_remove_anchor(id) {
                return Err(SimError::Check(format!("tracked anchor {} refused removal", id)));
            }
            world.shadow.record(TrackableKind::Anchor, id, ShadowOp::Absent);
        } else if !tracked.is_empty() && world.oracle.chance(0.2) {
            let id = tracked[world.oracle.pick(tracked.len())];
            world.session.anchors.update(Anchor {
                id,
                pose,
                tracking_state: TrackingState::Tracking,
                attached_to: None,
            });
            world.shadow.record(TrackableKind::Anchor, id, ShadowOp::Present);
        } else {
            let anchor = world
                .session
                .anchors
                .try_add_anchor(pose)
                .ok_or_else(|| SimError::Check("anchor creation refused".to_string()))?;
            world.shadow.record(TrackableKind::Anchor, anchor.id, ShadowOp::Present);
        }
        Ok(())
    }

    // ========================================================================
    // ANCHORS
    // ========================================================================

    fn run_anchors(&self, world: &mut SimWorld) -> Result<(), SimError> {
        let count = self.config.producers.max(2);
        info!("anchors: {} anchors, half attached to a floor", count);

        let plane_id = TrackableId::from_handle(TrackableKind::Plane.handle(), 0);
        let floor = world.oracle.square_plane(plane_id, Vector3::zeros(), 2.0, true);
        world.session.planes.register(floor);
        world.poll()?;

        let mut created = Vec::with_capacity(count);
        for i in 0..count {
            let pose = world.oracle.random_pose(2.0);
            let anchors = &mut world.session.anchors;
            let anchor = if i % 2 == 0 {
                anchors.try_add_anchor(pose)
            } else {
                anchors.try_attach_anchor(plane_id, pose)
            };
            created.push(
                anchor.ok_or_else(|| SimError::Check("anchor creation refused".to_string()))?,
            );
            world.metrics.mutations += 1;
        }

        let changes = world.poll()?;
        if changes.anchors.added.len() != count {
            return Err(SimError::Check(format!(
                "{} anchors added, expected {}",
                changes.anchors.added.len(),
                count
            )));
        }
        if changes
            .anchors
            .added
            .iter()
            .any(|a| a.tracking_state != TrackingState::Tracking)
        {
            return Err(SimError::Check("new anchor not reported as tracking".to_string()));
        }
        for (i, anchor) in created.iter().enumerate() {
            let expected = if i % 2 == 0 { None } else { Some(plane_id) };
            let attached = world.session.anchors.get(anchor.id).and_then(|a| a.attached_to);
            if attached != expected {
                return Err(SimError::Check(format!("anchor {} lost its attachment", anchor.id)));
            }
        }

        if world
            .session
            .anchors
            .try_remove_anchor(TrackableId::new(u64::MAX, u64::MAX))
        {
            return Err(SimError::Check("removing an unknown anchor succeeded".to_string()));
        }
        if world
            .session
            .anchors
            .try_attach_anchor(TrackableId::INVALID, Pose::identity())
            .is_some()
        {
            return Err(SimError::Check("attaching to the invalid id succeeded".to_string()));
        }

        let mut to_remove: Vec<TrackableId> = created.iter().step_by(2).map(|a| a.id).collect();
        for id in &to_remove {
            if !world.session.anchors.try_remove_anchor(*id) {
                return Err(SimError::Check(format!("anchor {} refused removal", id)));
            }
            world.metrics.mutations += 1;
        }

        let changes = world.poll()?;
        let mut removed = changes.anchors.removed.clone();
        removed.sort();
        to_remove.sort();
        if removed != to_remove {
            return Err(SimError::Check(format!(
                "{} anchors removed, expected {}",
                removed.len(),
                to_remove.len()
            )));
        }
        if world.session.anchors.tracked_count() != count - to_remove.len() {
            return Err(SimError::Check("anchor count mismatch after removal".to_string()));
        }

        self.idle(world, self.config.ticks.saturating_sub(3))
    }

    // ========================================================================
    // LIBRARY
    // ========================================================================

    fn run_library(&self, world: &mut SimWorld) -> Result<(), SimError> {
        let count = self.config.producers.max(3);
        info!("library: {} images and {} objects, every third unknown", count, count);

        let (image_keys, object_keys) = self.install_libraries(world, count);
        let known = |i: usize| i % 3 != 2;

        for pass in 0..2 {
            for i in 0..count {
                let pose = world.oracle.random_pose(2.0);
                let image_key = if known(i) { image_keys[i] } else { random_uuid(world) };
                let object_key = if known(i) { object_keys[i] } else { random_uuid(world) };

                let image_id = TrackableId::from_handle(TrackableKind::Image.handle(), i as i64);
                let object_id = TrackableId::from_handle(TrackableKind::Object.handle(), i as i64);
                let image = TrackedImage::new(image_id, pose, image_key);
                let object = TrackedObject::new(object_id, pose, object_key);

                if pass == 0 {
                    world.session.images.register(image);
                    world.session.objects.register(object);
                } else {
                    world.session.images.update(image);
                    world.session.objects.update(object);
                }
                world.metrics.mutations += 2;
            }

            let changes = world.poll()?;
            let expected = (0..count).filter(|i| known(*i)).count();
            let (images, objects) = if pass == 0 {
                (&changes.images.added, &changes.objects.added)
            } else {
                (&changes.images.updated, &changes.objects.updated)
            };

            if images.len() != expected || objects.len() != expected {
                return Err(SimError::Check(format!(
                    "pass {}: {} images and {} objects resolved, expected {}",
                    pass,
                    images.len(),
                    objects.len(),
                    expected
                )));
            }
            if pass == 1 && (!changes.images.added.is_empty() || !changes.objects.added.is_empty())
            {
                return Err(SimError::Check("unknown references became tracked".to_string()));
            }

            let library = world.session.images.library();
            for image in images {
                let entry = library
                    .find(image.texture_guid)
                    .ok_or_else(|| SimError::Check("image resolved without entry".to_string()))?;
                if image.source_image_id != entry.guid || image.size != entry.size {
                    return Err(SimError::Check(format!(
                        "image {} not bound to its library entry",
                        image.id
                    )));
                }
            }
            if objects.iter().any(|o| o.reference_object_id != o.reference_guid) {
                return Err(SimError::Check("object not bound to its library entry".to_string()));
            }
        }

        self.idle(world, self.config.ticks.saturating_sub(2))
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Builds image and object libraries of `count` entries each and installs them.
    /// Returns the image texture guids and the object guids producers should use.
    fn install_libraries(&self, world: &mut SimWorld, count: usize) -> (Vec<Uuid>, Vec<Uuid>) {
        let mut images = ReferenceLibrary::default();
        let mut objects = ReferenceLibrary::default();
        let mut image_keys = Vec::with_capacity(count);
        let mut object_keys = Vec::with_capacity(count);

        for i in 0..count {
            let texture = random_uuid(world);
            let side = 0.1 * (i + 1) as f64;
            images.add(
                ReferenceEntry::new(random_uuid(world), format!("image_{}", i))
                    .with_texture(texture)
                    .with_size(PlaneVector::new(side, side)),
            );
            image_keys.push(texture);

            let guid = random_uuid(world);
            objects.add(ReferenceEntry::new(guid, format!("object_{}", i)));
            object_keys.push(guid);
        }

        world.session.images.set_library(images);
        world.session.objects.set_library(objects);
        (image_keys, object_keys)
    }

    /// Polls `ticks` times with no producer input, expecting empty diffs.
    fn idle(&self, world: &mut SimWorld, ticks: u64) -> Result<(), SimError> {
        for _ in 0..ticks {
            let changes = world.poll()?;
            if !changes.is_empty() {
                return Err(SimError::Check(format!(
                    "poll without input produced {} changes",
                    changes.len()
                )));
            }
        }
        Ok(())
    }
}

fn random_uuid(world: &mut SimWorld) -> Uuid {
    Uuid::from_u128(world.oracle.rng().gen())
}

/// A known key most of the time, a fresh unknown one otherwise.
fn pick_key(world: &mut SimWorld, keys: &[Uuid]) -> (Uuid, bool) {
    if !keys.is_empty() && world.oracle.chance(0.8) {
        (keys[world.oracle.pick(keys.len())], true)
    } else {
        (random_uuid(world), false)
    }
}

fn x_range(points: &[PlanePoint]) -> (f64, f64) {
    points
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.x), hi.max(p.x)))
}
