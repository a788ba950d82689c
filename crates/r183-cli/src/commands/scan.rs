//! Implementation of the `replay183 scan` command.
//!
//! Parses each source without pacing and prints what was found: sentence
//! count, recorded time range and how much input was dropped.

use std::io::{BufWriter, Write, stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use r183_core::{SourceSummary, format_timestamp, scan_source};
use serde::Serialize;

use crate::source::Source;

/// One line of `scan --json` output.
#[derive(Debug, Serialize)]
struct ScanRecord<'a> {
    #[serde(flatten)]
    summary: &'a SourceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_at: Option<String>,
    span_ms: u64,
}

impl<'a> From<&'a SourceSummary> for ScanRecord<'a> {
    fn from(summary: &'a SourceSummary) -> Self {
        Self {
            summary,
            first_at: summary.first_timestamp.map(format_timestamp),
            last_at: summary.last_timestamp.map(format_timestamp),
            span_ms: u64::try_from(summary.span().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Run the scan command.
pub fn run(sources: &[Source], json: bool) -> Result<()> {
    let stdout = stdout();
    let mut writer = BufWriter::new(stdout.lock());

    for source in sources {
        let reader = source
            .open()
            .with_context(|| format!("failed to open {source}"))?;
        let summary = scan_source(&source.to_string(), reader)?;

        if json {
            serde_json::to_writer(&mut writer, &ScanRecord::from(&summary))
                .context("failed to serialize scan result")?;
            writeln!(writer)?;
        } else {
            writeln!(writer, "{}", render(&summary))?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Human-readable summary of one source.
fn render(summary: &SourceSummary) -> String {
    let stats = summary.stats;
    let dropped = format!(
        "  dropped: {} rejected tags, {} overflows, {} untagged sentences",
        stats.rejected_tags, stats.overflows, stats.orphan_sentences
    );

    let (Some(first), Some(last)) = (summary.first_timestamp, summary.last_timestamp) else {
        return format!("{}: no timestamped data\n{dropped}", summary.name);
    };

    format!(
        "{}: {} sentences\n  first:   {}\n  last:    {}\n  span:    {}\n{dropped}",
        summary.name,
        summary.sentences,
        format_timestamp(first),
        format_timestamp(last),
        format_span(summary.span()),
    )
}

/// Formats a duration as `HH:MM:SS.mmm`.
fn format_span(span: Duration) -> String {
    let ms = span.as_millis();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        ms / 60_000 % 60,
        ms / 1000 % 60,
        ms % 1000
    )
}
