//! Reference extraction from formula trees.
//!
//! Produces the set of coordinates a formula reads, for dependency graph
//! construction; the evaluator shares the range expansion.

use rustc_hash::FxHashSet;

use crate::coord::Coord;

use super::parser::Expr;

/// All coordinates a formula reads: every cell reference, plus every cell of
/// every range. Deduplicated; reversed range bounds are normalized.
///
/// The walk uses an explicit work stack, so tree depth is independent of the
/// call stack.
pub fn extract_refs(expr: &Expr) -> FxHashSet<Coord> {
    let mut refs = FxHashSet::default();
    let mut stack = vec![expr];

    while let Some(node) = stack.pop() {
        match node {
            Expr::Number(_) => {}
            Expr::CellRef(coord) => {
                refs.insert(*coord);
            }
            Expr::Range(start, end) => {
                refs.extend(range_coords(*start, *end));
            }
            Expr::Function { args, .. } => {
                stack.extend(args.iter());
            }
            Expr::BinaryOp { left, right, .. } => {
                stack.push(left);
                stack.push(right);
            }
        }
    }

    refs
}

/// The rectangular block a range covers, row-major.
///
/// Bounds are normalized (min/max on rows and columns), so a reversed
/// selection like `B2:A1` reads the same as `A1:B2`.
pub fn range_coords(a: Coord, b: Coord) -> impl Iterator<Item = Coord> {
    let (row_start, row_end) = (a.row.min(b.row), a.row.max(b.row));
    let (col_start, col_end) = (a.col.min(b.col), a.col.max(b.col));
    (row_start..=row_end)
        .flat_map(move |row| (col_start..=col_end).map(move |col| Coord::new(row, col)))
}
