pub mod cell;
pub mod coord;
pub mod dep_graph;
pub mod formula;
pub mod grid;
pub mod recalc;
