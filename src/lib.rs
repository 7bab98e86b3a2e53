//! `sapling` - stepwise addition of sequences into a growing phylogenetic tree.
//!
//! The library half of the crate: sequence storage, the addition-order
//! planner, the probabilistic gap model, ancestral-vector propagation,
//! the arena tree with scoped splice/rollback, and the log-odds Viterbi
//! insertion aligner. The `sapling` binary wires these into the
//! insertion loop around an external ancestral-state reconstruction.

pub mod libs;

pub use crate::libs::io::{reader, writer};
