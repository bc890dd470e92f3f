//! Ground truth for simulation runs.
//!
//! The Oracle produces the synthetic sensor data producers feed into a session
//! (sampled floor patches, plane fixtures, random poses) from one seeded RNG.
//! The ShadowModel keeps the id sets a session is expected to track, so every
//! poll can be checked against it.

use arsim_core::{BoundedPlane, PlaneData, PlanePoint, PlaneVector, Pose, TrackableId};
use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

// ============================================================================
// TRACKABLE KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackableKind {
    Plane,
    PointCloud,
    Anchor,
    Image,
    Object,
    Probe,
}

impl TrackableKind {
    pub const ALL: [TrackableKind; 6] = [
        TrackableKind::Plane,
        TrackableKind::PointCloud,
        TrackableKind::Anchor,
        TrackableKind::Image,
        TrackableKind::Object,
        TrackableKind::Probe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrackableKind::Plane => "plane",
            TrackableKind::PointCloud => "point_cloud",
            TrackableKind::Anchor => "anchor",
            TrackableKind::Image => "image",
            TrackableKind::Object => "object",
            TrackableKind::Probe => "probe",
        }
    }

    /// Stable handle for deriving producer ids of this kind.
    pub fn handle(&self) -> u64 {
        0xA5_0000 + *self as u64
    }
}

// ============================================================================
// ORACLE
// ============================================================================

/// The Oracle - generates synthetic producer input.
pub struct Oracle {
    /// Master seed (separate from session ids to avoid interference)
    physics_seed: u64,

    physics_rng: ChaCha8Rng,

    /// Position noise standard deviation (meters)
    position_noise_std: f64,
}

impl Oracle {
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_seed,
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            position_noise_std: 0.01,
        }
    }

    pub fn seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn set_position_noise(&mut self, std_dev: f64) {
        self.position_noise_std = std_dev;
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.physics_rng
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.physics_rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    pub fn pick(&mut self, n: usize) -> usize {
        self.physics_rng.gen_range(0..n)
    }

    /// One draw of sensor noise.
    pub fn noise(&mut self) -> f64 {
        if self.position_noise_std <= 0.0 {
            return 0.0;
        }
        match Normal::new(0.0, self.position_noise_std) {
            Ok(normal) => normal.sample(&mut self.physics_rng),
            Err(e) => {
                warn!("Invalid noise std {}: {}", self.position_noise_std, e);
                0.0
            }
        }
    }

    /// Pose somewhere in a `extent` metre box around the origin, rotated about Y.
    pub fn random_pose(&mut self, extent: f64) -> Pose {
        let position = Vector3::new(
            self.physics_rng.gen_range(-extent..=extent),
            self.physics_rng.gen_range(0.0..=extent * 0.5),
            self.physics_rng.gen_range(-extent..=extent),
        );
        let yaw = self.physics_rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
        Pose::new(position, UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw))
    }

    pub fn random_points(&mut self, count: usize, extent: f64) -> Vec<Vector3<f64>> {
        (0..count)
            .map(|_| {
                Vector3::new(
                    self.physics_rng.gen_range(-extent..=extent),
                    self.physics_rng.gen_range(-extent..=extent),
                    self.physics_rng.gen_range(-extent..=extent),
                )
            })
            .collect()
    }

    /// Raycast hits on a horizontal floor patch around `center`.
    ///
    /// The first and third hits lie on a scan line along +Z through the centre, so a
    /// plane fitted to them faces +Z with an identity rotation. The rest are spread
    /// over the disc with horizontal noise.
    pub fn sample_floor_patch(
        &mut self,
        center: Vector3<f64>,
        radius: f64,
        samples: usize,
    ) -> Vec<Vector3<f64>> {
        let mut points = vec![
            center + Vector3::new(0.0, 0.0, radius),
            center + Vector3::new(radius, 0.0, 0.0),
            center - Vector3::new(0.0, 0.0, radius),
        ];

        for _ in 0..samples {
            let r = radius * self.physics_rng.gen::<f64>().sqrt();
            let theta = self.physics_rng.gen_range(0.0..std::f64::consts::TAU);
            let x = (r * theta.cos() + self.noise()).clamp(-radius, radius);
            let z = (r * theta.sin() + self.noise()).clamp(-radius, radius);
            points.push(center + Vector3::new(x, 0.0, z));
        }

        points
    }

    /// Axis-aligned square plane of half-width `half` at `position`.
    pub fn square_plane(
        &self,
        id: TrackableId,
        position: Vector3<f64>,
        half: f64,
        allow_merging: bool,
    ) -> PlaneData {
        let plane = BoundedPlane::new(
            id,
            Pose::from_position(position),
            PlaneVector::new(half * 2.0, half * 2.0),
        );
        let bounds = vec![
            PlanePoint::new(-half, -half),
            PlanePoint::new(half, -half),
            PlanePoint::new(half, half),
            PlanePoint::new(-half, half),
        ];
        PlaneData::new(plane.clone(), Some(bounds), allow_merging)
            .unwrap_or_else(|_| PlaneData::with_default_bounds(plane, allow_merging))
    }
}

// ============================================================================
// SHADOW MODEL
// ============================================================================

/// Expected effect of the last operation a producer issued for an id this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowOp {
    /// Registered or updated with resolvable data
    Present,

    /// Unregistered
    Absent,

    /// Registered or updated with data the session will drop
    Unchanged,
}

/// Expected tracked ids per kind. The last operation per id within a tick decides.
#[derive(Debug, Clone, Default)]
pub struct ShadowModel {
    tracked: BTreeMap<TrackableKind, BTreeSet<TrackableId>>,
    pending: BTreeMap<(TrackableKind, TrackableId), ShadowOp>,
}

impl ShadowModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: TrackableKind, id: TrackableId, op: ShadowOp) {
        self.pending.insert((kind, id), op);
    }

    /// Applies the ops recorded since the last poll.
    pub fn apply(&mut self) {
        for ((kind, id), op) in std::mem::take(&mut self.pending) {
            let ids = self.tracked.entry(kind).or_default();
            match op {
                ShadowOp::Present => {
                    ids.insert(id);
                }
                ShadowOp::Absent => {
                    ids.remove(&id);
                }
                ShadowOp::Unchanged => {}
            }
        }
    }

    pub fn is_tracked(&self, kind: TrackableKind, id: TrackableId) -> bool {
        self.tracked.get(&kind).is_some_and(|ids| ids.contains(&id))
    }

    /// Expected tracked ids of `kind`.
    pub fn expected(&self, kind: TrackableKind) -> BTreeSet<TrackableId> {
        self.tracked.get(&kind).cloned().unwrap_or_default()
    }

    pub fn expected_count(&self) -> usize {
        self.tracked.values().map(BTreeSet::len).sum()
    }
}
