//! Byte-level extraction of TAG-timestamped sentences.
//!
//! Input looks like `\c:1420070400123,s:gps\$GPGGA,...*hh\r\n`. The parser
//! walks the stream one byte at a time, tracks where it is in the TAG block,
//! and hands back the sentence that follows a block carrying a valid `c:`
//! field. Anything malformed is dropped silently and scanning resumes.

use std::borrow::Cow;
use std::io::{self, BufRead};

use serde::Serialize;

use crate::timestamp::normalize_timestamp;

/// Size of the unit buffer, counting the terminating marker.
pub const MAX_BUFFER: usize = 92;

/// Maximum number of bytes stored for one unit (timestamp token or sentence).
pub const MAX_UNIT_LEN: usize = MAX_BUFFER - 1;

/// Position within the TAG/sentence grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between units, waiting for a TAG block to open.
    NoData,
    /// At the start of a TAG field key.
    TagFirst,
    /// Read a `c` at the start of a key, waiting for `:`.
    TagCode,
    /// Inside a TAG field we do not care about.
    Tag,
    /// TAG block closed with a valid timestamp.
    TagSeen,
    /// Accumulating sentence bytes.
    Sentence,
    /// Accumulating the `c:` timestamp token.
    Time,
}

/// A sentence together with the timestamp from its TAG block.
///
/// Borrows the parser's buffer: the next call to
/// [`TagParser::next_sentence`] overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedSentence<'a> {
    /// Milliseconds since the Unix epoch. Never zero.
    pub timestamp: i64,
    /// Sentence bytes from `$`/`!` up to, but excluding, the line terminator.
    pub sentence: &'a [u8],
}

impl TaggedSentence<'_> {
    /// Sentence text for logging.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.sentence)
    }
}

/// Counters describing what the parser dropped along the way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Tagged sentences returned.
    pub sentences: u64,
    /// TAG blocks closed or abandoned without a usable timestamp.
    pub rejected_tags: u64,
    /// Units discarded for exceeding [`MAX_UNIT_LEN`].
    pub overflows: u64,
    /// Sentence starts seen without a preceding TAG block.
    pub orphan_sentences: u64,
}

/// Streaming TAG block parser over a buffered reader.
pub struct TagParser<R> {
    reader: R,
    state: State,
    buf: Vec<u8>,
    timestamp: Option<i64>,
    stats: ParseStats,
}

impl<R: BufRead> TagParser<R> {
    /// Creates a parser positioned at the start of `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: State::NoData,
            buf: Vec::with_capacity(MAX_BUFFER),
            timestamp: None,
            stats: ParseStats::default(),
        }
    }

    /// Returns the next tagged sentence.
    ///
    /// `Ok(None)` means the stream ended before another complete tagged
    /// sentence was found. Interrupted reads are retried; any other read
    /// error is returned as-is.
    pub fn next_sentence(&mut self) -> io::Result<Option<TaggedSentence<'_>>> {
        self.restart();

        loop {
            let Some(byte) = self.next_byte()? else {
                return Ok(None);
            };
            if let Some(timestamp) = self.feed(byte) {
                return Ok(Some(TaggedSentence {
                    timestamp,
                    sentence: &self.buf,
                }));
            }
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(&[byte, ..]) => {
                    self.reader.consume(1);
                    return Ok(Some(byte));
                }
                Ok(_) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R> TagParser<R> {
    /// Counters accumulated since the parser was created.
    pub const fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Gives back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Advances the state machine by one byte. Returns the timestamp when a
    /// sentence has just been completed in `buf`.
    fn feed(&mut self, byte: u8) -> Option<i64> {
        match byte {
            b'$' | b'!' => self.sentence_start(byte),
            b'\\' => self.tag_delimiter(),
            b'\n' | b'\0' => return self.end_of_line(),
            b',' => match self.state {
                State::Time => self.close_time_field(State::TagFirst),
                State::Tag | State::TagCode => self.state = State::TagFirst,
                State::Sentence => self.store(byte),
                _ => {}
            },
            // A checksum ends the block's fields just like a comma ends one.
            b'*' if self.state == State::Time => self.close_time_field(State::Tag),
            b'c' => match self.state {
                State::TagFirst if self.timestamp.is_some() => {
                    tracing::trace!("duplicate c: field in TAG block");
                    self.reject();
                }
                State::TagFirst => self.state = State::TagCode,
                // Never part of a timestamp token.
                State::Time => {}
                _ => self.other(byte),
            },
            b':' if self.state == State::TagCode => {
                self.buf.clear();
                self.state = State::Time;
            }
            _ => self.other(byte),
        }
        None
    }

    fn sentence_start(&mut self, byte: u8) {
        if self.state == State::TagSeen {
            self.buf.clear();
            self.buf.push(byte);
            self.state = State::Sentence;
        } else {
            self.stats.orphan_sentences += 1;
            self.restart();
        }
    }

    fn tag_delimiter(&mut self) {
        match self.state {
            State::Time => {
                self.close_time_field(State::Tag);
                self.close_tag();
            }
            State::Tag | State::TagCode => self.close_tag(),
            State::TagFirst if self.timestamp.is_some() => self.state = State::TagSeen,
            // Either an opening delimiter or an unterminated block being
            // superseded by a new one.
            _ => {
                self.buf.clear();
                self.timestamp = None;
                self.state = State::TagFirst;
            }
        }
    }

    fn close_tag(&mut self) {
        if self.timestamp.is_some() {
            self.state = State::TagSeen;
        } else {
            tracing::trace!("TAG block without usable timestamp");
            self.reject();
        }
    }

    fn close_time_field(&mut self, next: State) {
        self.timestamp = normalize_timestamp(&self.buf);
        if self.timestamp.is_none() {
            tracing::trace!(token = %String::from_utf8_lossy(&self.buf), "invalid c: timestamp");
        }
        self.buf.clear();
        self.state = next;
    }

    fn end_of_line(&mut self) -> Option<i64> {
        if self.state != State::Sentence {
            self.restart();
            return None;
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        self.stats.sentences += 1;
        self.state = State::NoData;
        self.timestamp
    }

    fn other(&mut self, byte: u8) {
        match self.state {
            State::Sentence | State::Time => self.store(byte),
            State::TagFirst | State::TagCode => self.state = State::Tag,
            _ => {}
        }
    }

    fn store(&mut self, byte: u8) {
        if self.buf.len() < MAX_UNIT_LEN {
            self.buf.push(byte);
            return;
        }
        tracing::trace!(state = ?self.state, "unit exceeds buffer, discarding");
        self.stats.overflows += 1;
        self.restart();
    }

    fn reject(&mut self) {
        self.stats.rejected_tags += 1;
        self.restart();
    }

    fn restart(&mut self) {
        self.state = State::NoData;
        self.buf.clear();
        self.timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> (Vec<(i64, String)>, ParseStats) {
        let mut parser = TagParser::new(input);
        let mut out = Vec::new();
        while let Some(tagged) = parser.next_sentence().unwrap() {
            out.push((tagged.timestamp, tagged.text().into_owned()));
        }
        (out, parser.stats())
    }

    #[test]
    fn test_extracts_millisecond_tag() {
        let (out, stats) = parse_all(b"\\c:1420070400123*1A\\$GPGGA,123519,4807.038,N*47\r\n");
        assert_eq!(
            out,
            vec![(1_420_070_400_123, "$GPGGA,123519,4807.038,N*47".to_string())]
        );
        assert_eq!(stats.sentences, 1);
    }

    #[test]
    fn test_seconds_tag_is_scaled() {
        let (out, _) = parse_all(b"\\c:1420070400\\!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 1_420_070_400_000);
        assert!(out[0].1.starts_with("!AIVDM"));
    }

    #[test]
    fn test_strips_only_carriage_return_before_line_feed() {
        let (out, _) = parse_all(b"\\c:1420070400123\\$GPXXX,a\rb\r\n");
        assert_eq!(out[0].1, "$GPXXX,a\rb");
    }

    #[test]
    fn test_timestamp_field_after_other_fields() {
        let (out, _) = parse_all(b"\\s:gps1,c:1420070400123,n:42*5B\\$GPRMC,1\n");
        assert_eq!(out, vec![(1_420_070_400_123, "$GPRMC,1".to_string())]);
    }

    #[test]
    fn test_other_fields_containing_c_are_ignored() {
        let (out, _) = parse_all(b"\\s:src,c:1420070400123,t:clock\\$GPRMC,1\n");
        assert_eq!(out.len(), 1);

        let (out, _) = parse_all(b"\\cx:5,c:1420070400123\\$GPRMC,1\n");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_tag_without_timestamp_produces_nothing_then_resyncs() {
        let input = b"\\s:gps1*00\\$GPRMC,skip\n\\c:1420070400500\\$GPRMC,keep\n";
        let (out, stats) = parse_all(input);
        assert_eq!(out, vec![(1_420_070_400_500, "$GPRMC,keep".to_string())]);
        assert_eq!(stats.rejected_tags, 1);
    }

    #[test]
    fn test_untagged_sentences_are_skipped() {
        let input = b"$GPRMC,untagged\n\\c:1420070400500\\$GPRMC,tagged\n";
        let (out, stats) = parse_all(input);
        assert_eq!(out, vec![(1_420_070_400_500, "$GPRMC,tagged".to_string())]);
        assert_eq!(stats.orphan_sentences, 1);
    }

    #[test]
    fn test_invalid_timestamps_reject_the_tag() {
        for tag in [
            &b"\\c:142007040\\$GPRMC\n"[..],
            &b"\\c:1420070400123456\\$GPRMC\n"[..],
            &b"\\c:0000000000000\\$GPRMC\n"[..],
            &b"\\c:\\$GPRMC\n"[..],
        ] {
            let (out, _) = parse_all(tag);
            assert!(out.is_empty(), "accepted {:?}", String::from_utf8_lossy(tag));
        }
    }

    #[test]
    fn test_duplicate_timestamp_field_rejects_block() {
        let (out, stats) = parse_all(b"\\c:1420070400123,c:1420070400999\\$GPRMC\n");
        assert!(out.is_empty());
        assert_eq!(stats.rejected_tags, 1);
    }

    #[test]
    fn test_checksum_delimiter_closes_timestamp_field() {
        let (out, _) = parse_all(b"\\c:1420070400*7F\\$GPRMC\n");
        assert_eq!(out[0].0, 1_420_070_400_000);
    }

    #[test]
    fn test_oversize_sentence_dropped_and_next_found() {
        let mut input = b"\\c:1420070400100\\$GPLONG,".to_vec();
        input.extend(std::iter::repeat_n(b'x', 100));
        input.extend_from_slice(b"\r\n\\c:1420070400200\\$GPRMC,ok\r\n");

        let (out, stats) = parse_all(&input);
        assert_eq!(out, vec![(1_420_070_400_200, "$GPRMC,ok".to_string())]);
        assert_eq!(stats.overflows, 1);
    }

    #[test]
    fn test_buffer_bound_is_inclusive_of_max_unit_len() {
        let body = format!("${}", "A".repeat(MAX_UNIT_LEN - 1));
        let input = format!("\\c:1420070400100\\{body}\n");
        let (out, _) = parse_all(input.as_bytes());
        assert_eq!(out[0].1.len(), MAX_UNIT_LEN);

        let body = format!("${}", "A".repeat(MAX_UNIT_LEN));
        let input = format!("\\c:1420070400100\\{body}\n");
        let (out, stats) = parse_all(input.as_bytes());
        assert!(out.is_empty());
        assert_eq!(stats.overflows, 1);
    }

    #[test]
    fn test_nul_terminates_sentence() {
        let (out, _) = parse_all(b"\\c:1420070400100\\$GPRMC,a\0junk\n");
        assert_eq!(out, vec![(1_420_070_400_100, "$GPRMC,a".to_string())]);
    }

    #[test]
    fn test_backslash_inside_sentence_starts_new_tag() {
        let input = b"\\c:1420070400100\\$GPRMC,cut\\c:1420070400200\\$GPRMC,whole\n";
        let (out, _) = parse_all(input);
        assert_eq!(out, vec![(1_420_070_400_200, "$GPRMC,whole".to_string())]);
    }

    #[test]
    fn test_tag_split_across_lines_is_dropped() {
        let input = b"\\c:1420070400100\n\\$GPRMC,a\n";
        let (out, _) = parse_all(input);
        assert!(out.is_empty());
    }

    #[test]
    fn test_reparsing_is_idempotent() {
        let input = b"\\c:1420070400100\\$GPRMC,a\r\n\\c:1420070402100\\!AIVDM,b\r\n";
        assert_eq!(parse_all(input).0, parse_all(input).0);
    }

    #[test]
    fn test_empty_and_untagged_streams_yield_none() {
        assert!(parse_all(b"").0.is_empty());
        assert!(parse_all(b"$GPRMC,1\n$GPRMC,2\n").0.is_empty());
    }

    #[test]
    fn test_read_errors_are_returned() {
        struct Failing;
        impl io::Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("boom"))
            }
        }

        let mut parser = TagParser::new(io::BufReader::new(Failing));
        assert!(parser.next_sentence().is_err());
    }
}
