//! CLI subcommand implementations.

pub mod play;
pub mod scan;
