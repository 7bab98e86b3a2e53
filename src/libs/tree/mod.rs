//! Unrooted bifurcating tree with scoped splice/rollback and the
//! bottom-up traversal planner feeding ancestral-vector recomputation.

pub mod newick;

mod node;
mod tree;

pub use node::{Node, NodeId, ViewRecord};
pub use tree::{RootedBifurcation, Splice, Tree};
