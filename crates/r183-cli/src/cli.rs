//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use r183_core::Repeat;

use crate::source::Source;

/// Replay TAG-timestamped NMEA-0183 logs in real time.
///
/// Sentences are written to stdout with the same relative spacing they were
/// recorded with, as given by the `c:` field of each sentence's TAG block.
#[derive(Debug, Parser)]
#[command(name = "replay183", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay sources to stdout at their recorded pace.
    Play(PlayArgs),

    /// Summarise the tagged data in sources without replaying them.
    Scan {
        /// Output one JSON object per source.
        #[arg(long)]
        json: bool,

        /// Files to scan (`-` for stdin).
        #[arg(required = true, value_name = "FILE")]
        sources: Vec<Source>,
    },
}

/// Options for `replay183 play`. Unset options fall back to the config file.
#[derive(Debug, Args)]
pub struct PlayArgs {
    /// Terminate sentences with CR+LF instead of LF.
    #[arg(short = 'r', long)]
    pub crlf: bool,

    /// Pause between consecutive sources, in milliseconds.
    #[arg(short, long, value_name = "MS")]
    pub delay: Option<u64>,

    /// Number of passes over the sources, or "forever".
    #[arg(short, long, value_name = "N|forever")]
    pub loops: Option<Repeat>,

    /// Skip sources without timestamped data instead of failing.
    #[arg(long)]
    pub skip_empty: bool,

    /// Files to replay, in order (`-` for stdin).
    #[arg(required = true, value_name = "FILE")]
    pub sources: Vec<Source>,
}
