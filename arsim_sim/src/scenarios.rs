//! Scenarios the harness can drive a session through.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Two overlapping coplanar squares registered in one cycle fold into one plane
    PlaneMerge,

    /// Noisy sampled patches of one floor are fitted and merged into a single plane
    FloorScan,

    /// Random register/update/unregister across every kind, checked against a shadow model
    Churn,

    /// Anchor add/attach/remove life cycle
    Anchors,

    /// Image and object resolution against reference libraries
    Library,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::PlaneMerge,
            ScenarioId::FloorScan,
            ScenarioId::Churn,
            ScenarioId::Anchors,
            ScenarioId::Library,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PlaneMerge => "plane_merge",
            ScenarioId::FloorScan => "floor_scan",
            ScenarioId::Churn => "churn",
            ScenarioId::Anchors => "anchors",
            ScenarioId::Library => "library",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PlaneMerge => "Two overlapping squares in one cycle, expect one merged plane",
            ScenarioId::FloorScan => "Fit noisy floor patches and fuse them into one tracked plane",
            ScenarioId::Churn => "Random mutations on all six kinds against a shadow model",
            ScenarioId::Anchors => "Add, attach and remove anchors through the anchor API",
            ScenarioId::Library => "Resolve images and objects against reference libraries",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plane_merge" | "planemerge" | "merge" => Ok(ScenarioId::PlaneMerge),
            "floor_scan" | "floorscan" | "floor" => Ok(ScenarioId::FloorScan),
            "churn" => Ok(ScenarioId::Churn),
            "anchors" | "anchor" => Ok(ScenarioId::Anchors),
            "library" | "images" | "objects" => Ok(ScenarioId::Library),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert!(!scenario.description().is_empty());
        }
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
