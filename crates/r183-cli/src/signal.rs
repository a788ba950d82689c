//! Ctrl-C handling for an in-progress replay.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use r183_core::CancelHandle;

/// Exit status used when a second interrupt forces the process down.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cancels the replay on the first Ctrl-C and exits on the second.
///
/// The second press matters when the replay is blocked reading a terminal
/// rather than waiting on the scheduler.
pub fn install_cancel_handler(handle: CancelHandle) -> Result<()> {
    let interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        tracing::info!("received interrupt, stopping replay");
        handle.cancel();
    })
    .context("failed to install Ctrl-C handler")
}
