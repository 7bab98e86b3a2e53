pub mod align;
pub mod builder;
pub mod dna;
pub mod gap_model;
pub mod io;
pub mod order;
pub mod pvec;
pub mod raxml;
pub mod sequences;
pub mod tree;
pub mod viterbi;
