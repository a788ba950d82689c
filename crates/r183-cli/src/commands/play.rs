//! Implementation of the `replay183 play` command.
//!
//! Replays every source to stdout, pacing sentences by their TAG timestamps.

use std::io::{self, ErrorKind};

use anyhow::{Result, bail};
use r183_core::{CancellableWaiter, MonotonicClock, Repeat, ReplayError, Replayer, RunSummary};

use crate::config::Config;
use crate::signal::install_cancel_handler;
use crate::source::Source;

/// Run the play command.
pub fn run(config: &Config, sources: &[Source]) -> Result<()> {
    if config.loops != Repeat::ONCE && sources.iter().any(Source::is_stdin) {
        bail!("standard input can only be replayed once (loops = {})", config.loops);
    }

    let waiter = CancellableWaiter::new();
    install_cancel_handler(waiter.cancel_handle())?;

    let replayer = Replayer::new(MonotonicClock::new(), waiter, config.replay_options());
    tracing::debug!(options = ?replayer.options(), sources = sources.len(), "starting replay");

    let stdout = io::stdout();
    let mut sink = stdout.lock();
    let summary = match replayer.run(sources, Source::open, &mut sink) {
        Ok(summary) => summary,
        // Handle broken pipe gracefully (e.g., when piped to `head`)
        Err(ReplayError::Write(e)) if e.kind() == ErrorKind::BrokenPipe => {
            tracing::debug!("output closed, stopping replay");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    log_summary(&summary);
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    if summary.interrupted {
        tracing::info!(sentences = summary.sentences, "replay interrupted");
    } else {
        tracing::info!(
            passes = summary.passes,
            sources = summary.sources_played,
            skipped = summary.sources_skipped,
            sentences = summary.sentences,
            "replay complete"
        );
    }
}
