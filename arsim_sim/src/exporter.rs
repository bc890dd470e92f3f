//! JSON exporter for simulation runs.
//!
//! One frame per poll: diff sizes per kind plus the world-space outline of every
//! tracked plane, for offline inspection or plotting.

use crate::error::SimError;
use arsim_core::{PlaneData, SessionChanges, SimulationSession};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Diff sizes of one kind in one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// World-space outline of a tracked plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneOutline {
    pub id: String,
    pub classification: String,
    pub points: Vec<[f64; 3]>,
}

impl PlaneOutline {
    pub fn from_plane(plane: &PlaneData) -> Self {
        let pose = plane.pose();
        let points = plane
            .bounds()
            .iter()
            .map(|p| {
                let world = pose.transform_point(&Vector3::new(p.x, 0.0, p.y));
                [world.x, world.y, world.z]
            })
            .collect();

        Self {
            id: plane.id().to_string(),
            classification: format!("{:?}", plane.plane.classification),
            points,
        }
    }
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub tick: u64,
    pub planes: DiffCounts,
    pub point_clouds: DiffCounts,
    pub anchors: DiffCounts,
    pub images: DiffCounts,
    pub objects: DiffCounts,
    pub probes: DiffCounts,

    /// Tracked entities across every kind after the poll
    pub tracked: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plane_outlines: Vec<PlaneOutline>,
}

impl SimFrame {
    pub fn capture(tick: u64, changes: &SessionChanges, session: &SimulationSession) -> Self {
        Self {
            tick,
            planes: counts(&changes.planes),
            point_clouds: counts(&changes.point_clouds),
            anchors: counts(&changes.anchors),
            images: counts(&changes.images),
            objects: counts(&changes.objects),
            probes: counts(&changes.probes),
            tracked: session.tracked_count(),
            plane_outlines: session.planes.tracked().map(PlaneOutline::from_plane).collect(),
        }
    }
}

fn counts<T>(changes: &arsim_core::ChangeSet<T>) -> DiffCounts {
    DiffCounts {
        added: changes.added.len(),
        updated: changes.updated.len(),
        removed: changes.removed.len(),
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final result
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn add_frame(&mut self, frame: SimFrame) {
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arsim_core::{BoundedPlane, PlanePoint, PlaneVector, Pose, TrackableId};

    #[test]
    fn test_outline_is_in_world_space() {
        let plane = BoundedPlane::new(
            TrackableId::new(1, 0),
            Pose::from_position(Vector3::new(10.0, 1.0, 0.0)),
            PlaneVector::new(2.0, 2.0),
        );
        let data = PlaneData::new(
            plane,
            Some(vec![
                PlanePoint::new(-1.0, -1.0),
                PlanePoint::new(1.0, -1.0),
                PlanePoint::new(0.0, 1.0),
            ]),
            true,
        )
        .unwrap();

        let outline = PlaneOutline::from_plane(&data);
        assert_eq!(outline.points[0], [9.0, 1.0, -1.0]);
        assert_eq!(outline.points[2], [10.0, 1.0, 1.0]);
        assert_eq!(outline.id, TrackableId::new(1, 0).to_string());
    }

    #[test]
    fn test_export_serializes_frames() {
        let mut session = SimulationSession::with_defaults();
        let changes = session.poll();

        let mut export = SimExport::new("plane_merge", 42);
        export.add_frame(SimFrame::capture(0, &changes, &session));
        export.finalize(true, None);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["frames"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["passed"], serde_json::Value::Bool(true));
        assert!(json.get("failure_reason").is_none());
    }
}
