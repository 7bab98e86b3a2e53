//! Subcommand modules for the binary `sapling`.

pub mod place;
