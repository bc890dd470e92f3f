//! ARSim Deterministic Scenario Harness
//!
//! Drives a [`arsim_core::SimulationSession`] through scripted and randomised
//! producer input and checks the reconcile invariants around every poll.
//!
//! # Core Principle
//!
//! All producer input comes from one seeded Oracle, so a (scenario, seed) pair
//! always replays the same run:
//! - **Ids**: session ids come from a seed derived from the master seed
//! - **Data**: poses, sampled floor patches and library guids come from a ChaCha8 stream
//! - **Checks**: a shadow model of the expected tracked sets is compared after each poll
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   SimWorld                   │
//! │  ┌────────┐  register/update   ┌──────────┐  │
//! │  │ Oracle │ ─────────────────► │ Session  │  │
//! │  └────────┘                    └────┬─────┘  │
//! │       │ record                      │ poll   │
//! │  ┌────▼────────┐   compare    ┌─────▼─────┐  │
//! │  │ ShadowModel │ ◄──────────► │ ChangeSet │  │
//! │  └─────────────┘              └───────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use arsim_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 8).run(ScenarioId::FloorScan);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
mod world;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{DiffCounts, PlaneOutline, SimExport, SimFrame};
pub use oracle::{Oracle, ShadowModel, ShadowOp, TrackableKind};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{ScenarioMetrics, SimConfig, SimWorld, TrackedSnapshot};
