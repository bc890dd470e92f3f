//! Error types for the geometry engine and plane records.
//!
//! Only contract violations surface as errors. Stale references inside the
//! registries are dropped and logged instead.

use thiserror::Error;

/// Invalid input handed to a geometry routine or plane constructor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// A boundary polygon was supplied with fewer than three points.
    #[error("Boundary requires at least 3 points to form a bounded plane, got {count}")]
    InsufficientBoundary { count: usize },

    /// A triangle was wound clockwise and auto-reversal was not allowed.
    #[error("Triangle has wrong winding direction (expected counter-clockwise)")]
    WrongWinding,

    /// Re-hulling a merged boundary collapsed it below three points.
    #[error("Merged boundary hull is degenerate ({count} points)")]
    DegenerateHull { count: usize },
}
