//! The cell grid: contents, computed values, and the edit pipeline.
//!
//! One edit runs parse → extract references → cycle check → commit →
//! ordered recompute of the affected subgraph. The cycle check is pure and
//! happens before anything is mutated, so a rejected edit leaves every piece
//! of state exactly as it was.

use std::fmt;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::cell::{format_number, Content};
use crate::coord::Coord;
use crate::dep_graph::DepGraph;
use crate::formula::eval::{evaluate, CellLookup, EvalError};
use crate::formula::parser::{self, FormulaOptions, ParseError};
use crate::formula::refs::extract_refs;
use crate::recalc::{CycleError, RecalcError, RecalcReport};

/// Why an edit was rejected outright. No state is touched on rejection.
#[derive(Debug, Clone)]
pub enum EditError {
    InvalidCoordinate(String),
    Parse(ParseError),
    Cycle(CycleError),
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::InvalidCoordinate(s) => write!(f, "invalid cell coordinate '{}'", s),
            EditError::Parse(e) => write!(f, "formula parse error: {}", e),
            EditError::Cycle(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EditError {}

impl From<ParseError> for EditError {
    fn from(e: ParseError) -> Self {
        EditError::Parse(e)
    }
}

impl From<CycleError> for EditError {
    fn from(e: CycleError) -> Self {
        EditError::Cycle(e)
    }
}

/// A spreadsheet grid with automatic recomputation.
///
/// Owns the cell contents, the computed-value caches keyed by coordinate,
/// and the dependency graph; the edit entry points keep the three
/// consistent. A formula coordinate present in `values` is "evaluated";
/// one present only in `errors` failed its last evaluation and reads as
/// [`EvalError::UnevaluatedReference`] until a later pass succeeds.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    cells: FxHashMap<Coord, Content>,
    values: FxHashMap<Coord, f64>,
    errors: FxHashMap<Coord, EvalError>,
    deps: DepGraph,
    options: FormulaOptions,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: FormulaOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &FormulaOptions {
        &self.options
    }

    /// Set a cell from raw user input, addressed in A1 notation
    /// (case-insensitive).
    ///
    /// Input starting with `=` is parsed as a formula; other input is stored
    /// as a number when it parses as one, text otherwise; empty input clears
    /// the cell. Returns the propagation report, or the error that rejected
    /// the edit with all prior state intact.
    pub fn set_cell(&mut self, coord: &str, raw: &str) -> Result<RecalcReport, EditError> {
        let parsed =
            Coord::parse(coord).ok_or_else(|| EditError::InvalidCoordinate(coord.to_string()))?;
        self.set(parsed, raw)
    }

    /// As [`Grid::set_cell`], with an already-parsed coordinate.
    pub fn set(&mut self, coord: Coord, raw: &str) -> Result<RecalcReport, EditError> {
        let trimmed = raw.trim();
        if trimmed.starts_with('=') {
            // Canonicalize to uppercase before parsing; the stored source
            // matches what the parser saw.
            let source = trimmed.to_ascii_uppercase();
            let ast = parser::parse(&source[1..], &self.options)?;
            let new_refs = extract_refs(&ast);
            if let Some(cycle) = self.deps.would_create_cycle(coord, &new_refs) {
                return Err(cycle.into());
            }
            self.deps.replace_edges(coord, new_refs);
            self.cells.insert(coord, Content::Formula { source, ast });
        } else {
            // Value edits drop any formula state the coordinate held.
            self.deps.clear_cell(coord);
            self.values.remove(&coord);
            self.errors.remove(&coord);
            if trimmed.is_empty() {
                self.cells.remove(&coord);
            } else if let Ok(n) = trimmed.parse::<f64>() {
                self.cells.insert(coord, Content::Number(n));
            } else {
                self.cells.insert(coord, Content::Text(trimmed.to_string()));
            }
        }
        Ok(self.recalculate(coord))
    }

    /// Recompute the edited cell and everything downstream of it, precedents
    /// before dependents.
    fn recalculate(&mut self, start: Coord) -> RecalcReport {
        let began = Instant::now();
        let order = self.deps.topo_order_affected(start);

        // Invalidate the whole affected set up front: a cell that fails
        // mid-pass must never be readable through its stale value.
        for coord in &order {
            self.values.remove(coord);
            self.errors.remove(coord);
        }

        let mut report = RecalcReport::default();
        for coord in order {
            let outcome = match self.cells.get(&coord) {
                Some(Content::Formula { ast, .. }) => {
                    let lookup = GridLookup {
                        cells: &self.cells,
                        values: &self.values,
                    };
                    Some(evaluate(ast, &lookup))
                }
                // Number/Text content needs no recomputation.
                _ => None,
            };
            match outcome {
                Some(Ok(value)) => {
                    self.values.insert(coord, value);
                    report.cells_recomputed += 1;
                }
                Some(Err(err)) => {
                    report.errors.push(RecalcError::new(coord, err.to_string()));
                    self.errors.insert(coord, err);
                    report.cells_recomputed += 1;
                }
                None => {}
            }
        }

        report.duration_ms = began.elapsed().as_millis() as u64;
        report
    }

    /// The content stored at a coordinate, if any.
    pub fn content(&self, coord: Coord) -> Option<&Content> {
        self.cells.get(&coord)
    }

    /// The computed state of a formula cell: `Some(Ok)` once evaluated,
    /// `Some(Err)` if its last evaluation failed, `None` for non-formulas.
    pub fn computed(&self, coord: Coord) -> Option<Result<f64, EvalError>> {
        if !matches!(self.cells.get(&coord), Some(Content::Formula { .. })) {
            return None;
        }
        if let Some(value) = self.values.get(&coord) {
            return Some(Ok(*value));
        }
        Some(Err(self
            .errors
            .get(&coord)
            .cloned()
            .unwrap_or(EvalError::UnevaluatedReference(coord))))
    }

    /// The numeric value of a cell as the evaluator would see it.
    pub fn value(&self, coord: Coord) -> Result<f64, EvalError> {
        GridLookup {
            cells: &self.cells,
            values: &self.values,
        }
        .value(coord)
    }

    /// What the grid shows for a cell: text, a formatted number, a
    /// formula's computed value, or `#ERR` when its last evaluation failed.
    pub fn display(&self, coord: Coord) -> String {
        match self.cells.get(&coord) {
            None => String::new(),
            Some(Content::Text(s)) => s.clone(),
            Some(Content::Number(n)) => format_number(*n),
            Some(Content::Formula { .. }) => match self.values.get(&coord) {
                Some(value) => format_number(*value),
                None => "#ERR".to_string(),
            },
        }
    }

    /// (max_row, max_col) over all non-empty cells, or None for an empty grid.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        let mut bounds = None;
        for coord in self.cells.keys() {
            let (row, col) = bounds.unwrap_or((0, 0));
            bounds = Some((row.max(coord.row), col.max(coord.col)));
        }
        bounds
    }

    /// All non-empty cells, in arbitrary order.
    pub fn cells(&self) -> impl Iterator<Item = (Coord, &Content)> + '_ {
        self.cells.iter().map(|(coord, content)| (*coord, content))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn dep_graph(&self) -> &DepGraph {
        &self.deps
    }
}

/// Value lookup the evaluator sees: contents plus the evaluated-value cache.
struct GridLookup<'a> {
    cells: &'a FxHashMap<Coord, Content>,
    values: &'a FxHashMap<Coord, f64>,
}

impl CellLookup for GridLookup<'_> {
    fn value(&self, coord: Coord) -> Result<f64, EvalError> {
        match self.cells.get(&coord) {
            None => Ok(0.0),
            Some(Content::Number(n)) => Ok(*n),
            Some(Content::Text(_)) => Err(EvalError::TypeMismatch(coord)),
            Some(Content::Formula { .. }) => self
                .values
                .get(&coord)
                .copied()
                .ok_or(EvalError::UnevaluatedReference(coord)),
        }
    }
}

/// The grid itself satisfies the evaluator's lookup capability, for callers
/// evaluating ad-hoc formulas against it.
impl CellLookup for Grid {
    fn value(&self, coord: Coord) -> Result<f64, EvalError> {
        Grid::value(self, coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::Func;

    fn coord(s: &str) -> Coord {
        Coord::parse(s).unwrap()
    }

    fn computed(grid: &Grid, cell: &str) -> Result<f64, EvalError> {
        grid.computed(coord(cell)).unwrap()
    }

    #[test]
    fn test_number_text_routing() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "42").unwrap();
        grid.set_cell("A2", "hello").unwrap();
        grid.set_cell("A3", "2.5").unwrap();

        assert_eq!(grid.content(coord("A1")), Some(&Content::Number(42.0)));
        assert_eq!(
            grid.content(coord("A2")),
            Some(&Content::Text("hello".to_string()))
        );
        assert_eq!(grid.content(coord("A3")), Some(&Content::Number(2.5)));
    }

    #[test]
    fn test_formula_evaluates_on_edit() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "4").unwrap();
        let report = grid.set_cell("B1", "=A1*2").unwrap();

        assert_eq!(report.cells_recomputed, 1);
        assert_eq!(computed(&grid, "B1"), Ok(8.0));
        assert_eq!(grid.display(coord("B1")), "8");
    }

    #[test]
    fn test_source_canonicalized_to_uppercase() {
        let mut grid = Grid::new();
        grid.set_cell("b1", "=a1+1").unwrap();
        match grid.content(coord("B1")) {
            Some(Content::Formula { source, .. }) => assert_eq!(source, "=A1+1"),
            other => panic!("expected formula, got {:?}", other),
        }
        assert_eq!(grid.dep_graph().precedents(coord("B1")).count(), 1);
    }

    #[test]
    fn test_chain_propagates_in_one_edit() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "1").unwrap();
        grid.set_cell("B1", "=A1+1").unwrap();
        grid.set_cell("C1", "=B1+1").unwrap();
        assert_eq!(computed(&grid, "C1"), Ok(3.0));

        grid.set_cell("A1", "10").unwrap();
        assert_eq!(computed(&grid, "B1"), Ok(11.0));
        assert_eq!(computed(&grid, "C1"), Ok(12.0));
    }

    #[test]
    fn test_diamond_sees_refreshed_precedents() {
        // D1 = B1 + C1 where C1 = B1 * 2 and B1 = A1: a plain breadth-first
        // pass can evaluate D1 against a stale C1. The topological order
        // must not.
        let mut grid = Grid::new();
        grid.set_cell("A1", "1").unwrap();
        grid.set_cell("B1", "=A1").unwrap();
        grid.set_cell("C1", "=B1*2").unwrap();
        grid.set_cell("D1", "=B1+C1").unwrap();
        assert_eq!(computed(&grid, "D1"), Ok(3.0));

        grid.set_cell("A1", "5").unwrap();
        assert_eq!(computed(&grid, "B1"), Ok(5.0));
        assert_eq!(computed(&grid, "C1"), Ok(10.0));
        assert_eq!(computed(&grid, "D1"), Ok(15.0));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "7").unwrap();

        let err = grid.set_cell("A1", "=A1+1").unwrap_err();
        assert!(matches!(err, EditError::Cycle(_)));
        // Prior state untouched.
        assert_eq!(grid.content(coord("A1")), Some(&Content::Number(7.0)));
        assert!(!grid.dep_graph().is_formula_cell(coord("A1")));
    }

    #[test]
    fn test_transitive_cycle_rejected_state_unchanged() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "1").unwrap();
        grid.set_cell("B1", "=A1+1").unwrap();
        grid.set_cell("C1", "=B1+1").unwrap();

        let err = grid.set_cell("A1", "=C1").unwrap_err();
        assert!(matches!(err, EditError::Cycle(_)));

        // Everything still reads exactly as before the attempt.
        assert_eq!(grid.content(coord("A1")), Some(&Content::Number(1.0)));
        assert_eq!(computed(&grid, "B1"), Ok(2.0));
        assert_eq!(computed(&grid, "C1"), Ok(3.0));
        assert_eq!(grid.dep_graph().formula_cell_count(), 2);
        grid.dep_graph().assert_consistent();

        // And the graph still accepts unrelated edits.
        grid.set_cell("A1", "=D1+1").unwrap();
        assert_eq!(computed(&grid, "A1"), Ok(1.0));
        assert_eq!(computed(&grid, "C1"), Ok(3.0));
    }

    #[test]
    fn test_parse_error_rejected_state_unchanged() {
        let mut grid = Grid::new();
        grid.set_cell("B1", "5").unwrap();

        let err = grid.set_cell("B1", "=SUM(1;2").unwrap_err();
        assert!(matches!(err, EditError::Parse(_)));
        assert_eq!(grid.content(coord("B1")), Some(&Content::Number(5.0)));
    }

    #[test]
    fn test_invalid_coordinate() {
        let mut grid = Grid::new();
        let err = grid.set_cell("1A", "5").unwrap_err();
        assert!(matches!(err, EditError::InvalidCoordinate(_)));
    }

    #[test]
    fn test_sum_over_range_with_empty() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "1").unwrap();
        grid.set_cell("A2", "2").unwrap();
        grid.set_cell("A3", "3").unwrap();
        grid.set_cell("B1", "=SUM(A1:A3)").unwrap();
        assert_eq!(computed(&grid, "B1"), Ok(6.0));

        grid.set_cell("A2", "").unwrap();
        assert_eq!(computed(&grid, "B1"), Ok(4.0));
    }

    #[test]
    fn test_empty_arguments_recorded_not_thrown() {
        let mut grid = Grid::new();
        let report = grid.set_cell("A1", "=MIN()").unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            computed(&grid, "A1"),
            Err(EvalError::EmptyArguments(Func::Min))
        );
        assert_eq!(grid.display(coord("A1")), "#ERR");
    }

    #[test]
    fn test_division_and_modulo_by_zero() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "=10/0").unwrap();
        grid.set_cell("A2", "=10%0").unwrap();
        assert_eq!(computed(&grid, "A1"), Err(EvalError::DivisionByZero));
        assert_eq!(computed(&grid, "A2"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_text_reference_is_type_mismatch() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "hello").unwrap();
        grid.set_cell("B1", "=A1+1").unwrap();
        assert_eq!(
            computed(&grid, "B1"),
            Err(EvalError::TypeMismatch(coord("A1")))
        );
    }

    #[test]
    fn test_failure_does_not_halt_propagation() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "1").unwrap();
        grid.set_cell("B1", "=A1/0").unwrap();
        grid.set_cell("C1", "=B1+1").unwrap();
        grid.set_cell("D1", "=A1+1").unwrap();

        // Edit A1: B1 fails, C1 fails against B1, D1 still recomputes.
        let report = grid.set_cell("A1", "2").unwrap();
        assert_eq!(report.cells_recomputed, 3);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(computed(&grid, "B1"), Err(EvalError::DivisionByZero));
        assert_eq!(
            computed(&grid, "C1"),
            Err(EvalError::UnevaluatedReference(coord("B1")))
        );
        assert_eq!(computed(&grid, "D1"), Ok(3.0));
    }

    #[test]
    fn test_error_clears_when_input_fixed() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "0").unwrap();
        grid.set_cell("B1", "=10/A1").unwrap();
        assert_eq!(computed(&grid, "B1"), Err(EvalError::DivisionByZero));

        grid.set_cell("A1", "5").unwrap();
        assert_eq!(computed(&grid, "B1"), Ok(2.0));
    }

    #[test]
    fn test_overwriting_formula_with_value_drops_edges() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "1").unwrap();
        grid.set_cell("B1", "=A1").unwrap();
        grid.set_cell("B1", "7").unwrap();

        assert_eq!(grid.dep_graph().dependents(coord("A1")).count(), 0);
        grid.set_cell("A1", "2").unwrap();
        assert_eq!(grid.content(coord("B1")), Some(&Content::Number(7.0)));
        // A formula may now legally reference A1 from B1's old spot.
        grid.set_cell("A1", "=B1").unwrap();
        assert_eq!(computed(&grid, "A1"), Ok(7.0));
    }

    #[test]
    fn test_clearing_cell() {
        let mut grid = Grid::new();
        grid.set_cell("A1", "3").unwrap();
        grid.set_cell("B1", "=A1+1").unwrap();
        grid.set_cell("A1", "").unwrap();

        assert_eq!(grid.content(coord("A1")), None);
        // Empty reads as zero downstream.
        assert_eq!(computed(&grid, "B1"), Ok(1.0));
    }

    #[test]
    fn test_bounds() {
        let mut grid = Grid::new();
        assert_eq!(grid.bounds(), None);
        grid.set_cell("C3", "1").unwrap();
        grid.set_cell("A5", "2").unwrap();
        assert_eq!(grid.bounds(), Some((4, 2)));
    }
}
