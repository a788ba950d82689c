//! replay183 CLI library.
//!
//! This crate provides the CLI interface for replaying TAG-timestamped logs.

mod cli;
pub mod commands;
mod config;
mod signal;
mod source;

pub use cli::{Cli, Commands, PlayArgs};
pub use config::Config;
pub use source::Source;
