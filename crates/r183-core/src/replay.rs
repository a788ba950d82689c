//! Paced playback of one or more tagged sources.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parser::{ParseStats, TagParser, TaggedSentence};
use crate::scheduler::{Anchor, Clock, Delay, WaitOutcome, Waiter};

/// Replay errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A source ended without yielding a single tagged sentence.
    #[error("no timestamped data available in {source_name}")]
    NoTimestampedData { source_name: String },
    /// Every source in a full pass was empty, so looping would spin forever.
    #[error("no timestamped data available in any source")]
    NothingToReplay,
    /// A source could not be opened.
    #[error("failed to open {source_name}")]
    Open {
        source_name: String,
        #[source]
        source: io::Error,
    },
    /// A source failed before its first tagged sentence.
    #[error("failed to read {source_name}")]
    Read {
        source_name: String,
        #[source]
        source: io::Error,
    },
    /// The output sink rejected a sentence.
    #[error("failed to write sentence")]
    Write(#[source] io::Error),
}

/// Line ending appended to every emitted sentence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
}

impl LineTerminator {
    #[must_use]
    pub const fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "lf",
            Self::CrLf => "crlf",
        }
    }
}

impl fmt::Display for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many times the list of sources is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RepeatRepr")]
pub enum Repeat {
    Times(NonZeroU32),
    Forever,
}

impl Repeat {
    pub const ONCE: Self = Self::Times(NonZeroU32::MIN);

    /// Whether another pass should start after `completed` passes.
    #[must_use]
    pub const fn continues_after(&self, completed: u32) -> bool {
        match self {
            Self::Times(n) => completed < n.get(),
            Self::Forever => true,
        }
    }
}

impl Default for Repeat {
    fn default() -> Self {
        Self::ONCE
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Times(n) => write!(f, "{n}"),
            Self::Forever => f.write_str("forever"),
        }
    }
}

/// Rejected `--loops` / `loops` value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid repeat count {value:?}: expected a positive integer or \"forever\"")]
pub struct InvalidRepeat {
    value: String,
}

impl FromStr for Repeat {
    type Err = InvalidRepeat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("forever") {
            return Ok(Self::Forever);
        }
        s.parse::<NonZeroU32>()
            .map(Self::Times)
            .map_err(|_| InvalidRepeat {
                value: s.to_string(),
            })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RepeatRepr {
    Count(u32),
    Word(String),
}

impl TryFrom<RepeatRepr> for Repeat {
    type Error = InvalidRepeat;

    fn try_from(repr: RepeatRepr) -> Result<Self, Self::Error> {
        match repr {
            RepeatRepr::Count(n) => NonZeroU32::new(n).map(Self::Times).ok_or(InvalidRepeat {
                value: n.to_string(),
            }),
            RepeatRepr::Word(word) => word.parse(),
        }
    }
}

impl Serialize for Repeat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Times(n) => serializer.serialize_u32(n.get()),
            Self::Forever => serializer.serialize_str("forever"),
        }
    }
}

/// Knobs honoured by [`Replayer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    pub terminator: LineTerminator,
    /// Static pause before the first line of every source after the first.
    pub inter_source_delay: Duration,
    pub repeat: Repeat,
    /// Skip sources without tagged data instead of failing the run.
    pub skip_empty: bool,
}

/// Outcome of replaying (or scanning) a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub sentences: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<i64>,
    pub stats: ParseStats,
    pub interrupted: bool,
}

impl SourceSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sentences: 0,
            first_timestamp: None,
            last_timestamp: None,
            stats: ParseStats::default(),
            interrupted: false,
        }
    }

    /// Recorded time between the first and last sentence.
    pub fn span(&self) -> Duration {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => {
                Duration::from_millis(u64::try_from(last - first).unwrap_or(0))
            }
            _ => Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, timestamp: i64) {
        self.sentences += 1;
        self.first_timestamp.get_or_insert(timestamp);
        self.last_timestamp = Some(timestamp);
    }
}

/// Totals across a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources_played: u64,
    pub sources_skipped: u64,
    pub passes: u32,
    pub sentences: u64,
    pub interrupted: bool,
}

/// Replays tagged sources to a sink at their recorded pace.
pub struct Replayer<C, W> {
    clock: C,
    waiter: W,
    options: ReplayOptions,
}

impl<C: Clock, W: Waiter> Replayer<C, W> {
    pub const fn new(clock: C, waiter: W, options: ReplayOptions) -> Self {
        Self {
            clock,
            waiter,
            options,
        }
    }

    pub const fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Plays `sources` in order, `options.repeat` times.
    ///
    /// `open` turns each entry into a reader; it is called again on every
    /// pass so each repetition starts from the beginning.
    pub fn run<T, R, F, S>(
        &self,
        sources: &[T],
        mut open: F,
        sink: &mut S,
    ) -> Result<RunSummary, ReplayError>
    where
        T: fmt::Display,
        R: BufRead,
        F: FnMut(&T) -> io::Result<R>,
        S: Write,
    {
        let mut summary = RunSummary::default();

        loop {
            let sentences_before = summary.sentences;

            for source in sources {
                if self.waiter.is_cancelled() {
                    summary.interrupted = true;
                    return Ok(summary);
                }

                let source_name = source.to_string();
                let reader = open(source).map_err(|e| ReplayError::Open {
                    source_name: source_name.clone(),
                    source: e,
                })?;

                let lead_in = if summary.sentences > 0 {
                    self.options.inter_source_delay
                } else {
                    Duration::ZERO
                };

                match self.play_source(&source_name, reader, sink, lead_in) {
                    Ok(played) => {
                        tracing::info!(
                            source = %played.name,
                            sentences = played.sentences,
                            rejected_tags = played.stats.rejected_tags,
                            overflows = played.stats.overflows,
                            "finished source"
                        );
                        summary.sources_played += 1;
                        summary.sentences += played.sentences;
                        if played.interrupted {
                            summary.interrupted = true;
                            return Ok(summary);
                        }
                    }
                    Err(ReplayError::NoTimestampedData { source_name }) if self.options.skip_empty => {
                        tracing::warn!(source = %source_name, "no timestamped data, skipping");
                        summary.sources_skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            summary.passes += 1;
            if summary.sentences == sentences_before {
                return Err(ReplayError::NothingToReplay);
            }
            if !self.options.repeat.continues_after(summary.passes) {
                return Ok(summary);
            }
            tracing::debug!(pass = summary.passes + 1, "starting next pass");
        }
    }

    /// Replays one source: `START -> ANCHORED -> (delay, emit)* -> DONE`.
    ///
    /// `lead_in` is waited out after the first sentence is parsed and before
    /// the anchor is taken, so it never shifts the source's internal timing.
    pub fn play_source<R, S>(
        &self,
        source_name: &str,
        reader: R,
        sink: &mut S,
        lead_in: Duration,
    ) -> Result<SourceSummary, ReplayError>
    where
        R: BufRead,
        S: Write,
    {
        let mut parser = TagParser::new(reader);
        let mut summary = SourceSummary::new(source_name);

        let first = match parser.next_sentence() {
            Ok(Some(tagged)) => tagged,
            Ok(None) => {
                return Err(ReplayError::NoTimestampedData {
                    source_name: source_name.to_string(),
                });
            }
            Err(e) => {
                return Err(ReplayError::Read {
                    source_name: source_name.to_string(),
                    source: e,
                });
            }
        };

        if !lead_in.is_zero() && self.waiter.wait(lead_in) == WaitOutcome::Cancelled {
            summary.interrupted = true;
            summary.stats = parser.stats();
            return Ok(summary);
        }

        let anchor = Anchor::new(&self.clock, first.timestamp);
        tracing::info!(
            source = source_name,
            recorded_at = %crate::timestamp::format_timestamp(first.timestamp),
            "replaying source"
        );
        self.emit(sink, first)?;
        summary.record(first.timestamp);

        loop {
            if self.waiter.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let tagged = match parser.next_sentence() {
                Ok(Some(tagged)) => tagged,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(source = source_name, error = %e, "read failed, ending source");
                    break;
                }
            };

            if let Delay::Wait(delay) = anchor.delay_until(tagged.timestamp) {
                if self.waiter.wait(delay) == WaitOutcome::Cancelled {
                    summary.interrupted = true;
                    break;
                }
            }

            self.emit(sink, tagged)?;
            summary.record(tagged.timestamp);
        }

        summary.stats = parser.stats();
        Ok(summary)
    }

    fn emit<S: Write>(&self, sink: &mut S, tagged: TaggedSentence<'_>) -> Result<(), ReplayError> {
        tracing::trace!(timestamp = tagged.timestamp, sentence = %tagged.text(), "emit");
        write_line(sink, tagged.sentence, self.options.terminator).map_err(ReplayError::Write)
    }
}

/// Writes one sentence and flushes, so piped consumers see whole lines.
fn write_line<S: Write>(sink: &mut S, sentence: &[u8], terminator: LineTerminator) -> io::Result<()> {
    sink.write_all(sentence)?;
    sink.write_all(terminator.as_bytes())?;
    sink.flush()
}

/// Parses a whole source without pacing or output, for inspection.
pub fn scan_source<R: BufRead>(source_name: &str, reader: R) -> Result<SourceSummary, ReplayError> {
    let mut parser = TagParser::new(reader);
    let mut summary = SourceSummary::new(source_name);

    loop {
        match parser.next_sentence() {
            Ok(Some(tagged)) => summary.record(tagged.timestamp),
            Ok(None) => break,
            Err(e) => {
                return Err(ReplayError::Read {
                    source_name: source_name.to_string(),
                    source: e,
                });
            }
        }
    }

    summary.stats = parser.stats();
    Ok(summary)
}
