//! Core logic for replaying TAG-timestamped NMEA-0183 logs.
//!
//! This crate contains:
//! - Parser: extracting `(timestamp, sentence)` pairs from TAG blocks
//! - Timestamp: normalising `c:` fields to epoch milliseconds
//! - Scheduler: anchoring recorded time to the local clock and waiting
//! - Replay: pacing whole sources, playlists and repeats to a sink

pub mod parser;
mod replay;
pub mod scheduler;
pub mod timestamp;

pub use parser::{MAX_BUFFER, MAX_UNIT_LEN, ParseStats, TagParser, TaggedSentence};
pub use replay::{
    InvalidRepeat, LineTerminator, Repeat, ReplayError, ReplayOptions, Replayer, RunSummary,
    SourceSummary, scan_source,
};
pub use scheduler::{
    Anchor, CancelHandle, CancellableWaiter, Clock, Delay, MonotonicClock, WaitOutcome, Waiter,
};
pub use timestamp::{format_timestamp, normalize_timestamp};
