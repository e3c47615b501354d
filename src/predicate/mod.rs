//! Predicate trees: value/join comparisons, bind slots, normalisation

mod eval;
mod tree;

pub use eval::Tuple;
pub use tree::{ColumnRef, Comparator, LogicalOp, Operand, Predicate};
