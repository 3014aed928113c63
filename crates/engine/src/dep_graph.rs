//! Dependency graph for formula cells.
//!
//! Tracks precedents (cells a formula reads) and dependents (cells whose
//! formulas read a given cell) for cycle checks and ordered recomputation.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! This makes "what must recompute if A changes?" trivial: follow outgoing
//! edges.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::coord::Coord;
use crate::recalc::CycleError;

/// Persistent dependency graph for formula cells.
///
/// Maintains bidirectional adjacency for O(1) lookups:
/// - `preds[B]` = cells that B's formula reads (precedents)
/// - `succs[A]` = formula cells that read A (dependents)
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If A ∈ preds[B] then B ∈ succs[A], and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **No duplicate edges:** Set semantics enforced by FxHashSet.
/// 4. **Atomic updates:** `replace_edges` is the only mutator that touches both maps.
/// 5. **No cycles:** callers gate every commit behind `would_create_cycle`.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// Precedents: for each formula cell B, the cells A it reads.
    /// B -> {A1, A2, ...}
    preds: FxHashMap<Coord, FxHashSet<Coord>>,

    /// Dependents: for each referenced cell A, the formula cells B that read it.
    /// A -> {B1, B2, ...}
    succs: FxHashMap<Coord, FxHashSet<Coord>>,
}

impl DepGraph {
    /// Create an empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cells this formula cell reads (precedents).
    pub fn precedents(&self, cell: Coord) -> impl Iterator<Item = Coord> + '_ {
        self.preds
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Returns the formula cells that read this cell (dependents).
    pub fn dependents(&self, cell: Coord) -> impl Iterator<Item = Coord> + '_ {
        self.succs
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Returns true if this cell has formula dependencies tracked in the graph.
    pub fn is_formula_cell(&self, cell: Coord) -> bool {
        self.preds.contains_key(&cell)
    }

    /// Returns the number of formula cells (cells with precedents) in the graph.
    pub fn formula_cell_count(&self) -> usize {
        self.preds.len()
    }

    /// Replace all edges for a formula cell atomically.
    ///
    /// This is the primary mutation API. It:
    /// 1. Removes the cell from all its old precedents' dependent sets
    /// 2. Clears the cell's precedent set
    /// 3. Adds the cell to all new precedents' dependent sets
    /// 4. Sets the cell's new precedent set
    ///
    /// Pass an empty set to clear all edges for this cell.
    pub fn replace_edges(&mut self, formula_cell: Coord, new_preds: FxHashSet<Coord>) {
        // Step 1: Remove old edges
        if let Some(old_preds) = self.preds.remove(&formula_cell) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&formula_cell);
                    // Clean up empty entries (invariant: no dangling)
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        // Step 2: If no new precedents, we're done (cell is not a formula or has no refs)
        if new_preds.is_empty() {
            return;
        }

        // Step 3: Add new edges
        for pred in &new_preds {
            self.succs.entry(*pred).or_default().insert(formula_cell);
        }

        // Step 4: Store new precedents
        self.preds.insert(formula_cell, new_preds);
    }

    /// Clear all edges for a cell (formula removed or cell cleared).
    ///
    /// Convenience wrapper around `replace_edges` with an empty set.
    pub fn clear_cell(&mut self, cell: Coord) {
        self.replace_edges(cell, FxHashSet::default());
    }

    /// What-if cycle check: would pointing `cell`'s formula at `new_refs`
    /// make `cell` depend on itself?
    ///
    /// Pure read of the stored graph, performed before any mutation — a
    /// rejected edit needs no rollback, and a crash mid-check cannot leave
    /// the graph inconsistent. Walks forward reference edges (`preds`) from
    /// each proposed reference; a cycle exists iff `cell` is reachable.
    /// Self-reference (`cell ∈ new_refs`) is the degenerate case.
    pub fn would_create_cycle(
        &self,
        cell: Coord,
        new_refs: &FxHashSet<Coord>,
    ) -> Option<CycleError> {
        if new_refs.contains(&cell) {
            return Some(CycleError::self_reference(cell));
        }

        let mut visited = FxHashSet::default();
        let mut stack: Vec<Coord> = new_refs.iter().copied().collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(refs) = self.preds.get(&current) {
                if refs.contains(&cell) {
                    // current reads cell, and current is reachable from the
                    // proposed references: cell → ... → current → cell.
                    return Some(CycleError::cycle(vec![cell, current]));
                }
                stack.extend(refs.iter().copied());
            }
        }

        None
    }

    /// Evaluation order for one edit: `start` plus every transitive
    /// dependent, topologically sorted so precedents come before dependents.
    ///
    /// Kahn's algorithm over the affected subgraph, with (row, col)-sorted
    /// tie-breaking for deterministic output. The graph is cycle-free after
    /// every commit, so the order always covers the whole affected set.
    pub fn topo_order_affected(&self, start: Coord) -> Vec<Coord> {
        // Collect the affected set.
        let mut affected = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(cell) = stack.pop() {
            if !affected.insert(cell) {
                continue;
            }
            if let Some(deps) = self.succs.get(&cell) {
                stack.extend(deps.iter().copied());
            }
        }

        // In-degree within the affected set. Precedents outside it are
        // already up to date and don't gate anything.
        let mut in_degree: FxHashMap<Coord, usize> = FxHashMap::default();
        for &cell in &affected {
            let count = self
                .preds
                .get(&cell)
                .map(|preds| preds.iter().filter(|p| affected.contains(p)).count())
                .unwrap_or(0);
            in_degree.insert(cell, count);
        }

        // Sort in DESCENDING order so the smallest coord is popped first.
        let mut queue: Vec<Coord> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&cell, _)| cell)
            .collect();
        queue.sort_by(|a, b| b.cmp(a));

        let mut order = Vec::with_capacity(affected.len());
        while let Some(cell) = queue.pop() {
            order.push(cell);

            if let Some(deps) = self.succs.get(&cell) {
                let mut unlocked: Vec<Coord> = Vec::new();
                for &dep in deps {
                    if let Some(deg) = in_degree.get_mut(&dep) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            unlocked.push(dep);
                        }
                    }
                }
                unlocked.sort();
                for cell in unlocked.into_iter().rev() {
                    queue.push(cell);
                }
            }
        }

        order
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        // Invariant 1: Bidirectional consistency (preds → succs)
        for (formula_cell, preds) in &self.preds {
            for pred in preds {
                assert!(
                    self.succs
                        .get(pred)
                        .map_or(false, |s| s.contains(formula_cell)),
                    "Missing succ edge: {} should have {} in dependents",
                    pred,
                    formula_cell
                );
            }
        }

        // Invariant 1: Bidirectional consistency (succs → preds)
        for (cell, dependents) in &self.succs {
            for dep in dependents {
                assert!(
                    self.preds.get(dep).map_or(false, |s| s.contains(cell)),
                    "Missing pred edge: {} should have {} in precedents",
                    dep,
                    cell
                );
            }
        }

        // Invariant 2: No empty sets stored
        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "Empty preds set stored for {}", cell);
        }
        for (cell, succs) in &self.succs {
            assert!(!succs.is_empty(), "Empty succs set stored for {}", cell);
        }
    }
}
