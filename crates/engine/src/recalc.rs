//! Recalculation reporting and cycle errors.
//!
//! Types produced by one propagation pass: how much was recomputed, which
//! cells failed, and the error returned when an edit would close a cycle.

use serde::Serialize;

use crate::coord::Coord;

/// Report from one propagation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecalcReport {
    /// Number of formula cells that were re-evaluated.
    pub cells_recomputed: usize,

    /// Time taken for the pass in milliseconds.
    pub duration_ms: u64,

    /// Evaluation failures, one per failing cell. A failure never aborts
    /// the pass; dependents of a failed cell fail in turn and are recorded
    /// here too.
    pub errors: Vec<RecalcError>,
}

impl RecalcReport {
    /// Format as a concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} cells in {}ms, errors={}",
            self.cells_recomputed,
            self.duration_ms,
            self.errors.len()
        )
    }
}

/// An evaluation failure recorded against one cell during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct RecalcError {
    /// The cell where the error occurred.
    pub cell: Coord,

    /// Description of the error.
    pub error: String,
}

impl RecalcError {
    /// Create a new recalc error.
    pub fn new(cell: Coord, error: impl Into<String>) -> Self {
        Self {
            cell,
            error: error.into(),
        }
    }
}

/// A rejected edit: the proposed references would make the cell depend on
/// itself, directly or transitively.
#[derive(Debug, Clone)]
pub struct CycleError {
    /// Cells on the detected cycle. May be a subset for long cycles.
    pub cells: Vec<Coord>,

    /// Human-readable description of the cycle.
    message: String,
}

impl CycleError {
    /// A formula referencing its own coordinate — the smallest cycle.
    pub fn self_reference(cell: Coord) -> Self {
        Self {
            cells: vec![cell],
            message: format!("cell {} references itself", cell),
        }
    }

    /// A multi-cell cycle.
    pub fn cycle(cells: Vec<Coord>) -> Self {
        let path: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        Self {
            message: format!("circular reference: {}", path.join(" → ")),
            cells,
        }
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(s: &str) -> Coord {
        Coord::parse(s).unwrap()
    }

    #[test]
    fn test_report_summary() {
        let report = RecalcReport {
            cells_recomputed: 3,
            duration_ms: 1,
            errors: vec![RecalcError::new(coord("B2"), "division by zero")],
        };
        assert_eq!(report.summary(), "3 cells in 1ms, errors=1");
    }

    #[test]
    fn test_report_serializes() {
        let report = RecalcReport {
            cells_recomputed: 1,
            duration_ms: 0,
            errors: vec![],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"cells_recomputed\":1"));
    }

    #[test]
    fn test_cycle_error_self_reference() {
        let err = CycleError::self_reference(coord("A1"));
        assert_eq!(err.cells.len(), 1);
        assert!(err.to_string().contains("references itself"));
    }

    #[test]
    fn test_cycle_error_path() {
        let err = CycleError::cycle(vec![coord("A1"), coord("B2")]);
        assert!(err.to_string().contains("A1"));
        assert!(err.to_string().contains("B2"));
    }
}
