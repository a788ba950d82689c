//! TAG block `c:` timestamp normalisation.
//!
//! Recorders write the `c:` field either as whole seconds or as milliseconds
//! since the Unix epoch. The only way to tell them apart is the length of the
//! digit string, so that is what [`normalize_timestamp`] keys on.

use chrono::{DateTime, SecondsFormat, Utc};

/// Shortest accepted token (seconds since the epoch from 2001-09-09 onwards).
pub const MIN_TIMESTAMP_DIGITS: usize = 10;

/// Tokens shorter than this are seconds; longer ones are milliseconds.
pub const MILLIS_TIMESTAMP_DIGITS: usize = 13;

/// Longest accepted token.
pub const MAX_TIMESTAMP_DIGITS: usize = 15;

/// Converts a raw `c:` token into milliseconds since the epoch.
///
/// The leading ASCII digits are parsed as a base-10 integer; the token length
/// used for the seconds/milliseconds decision is the length of the whole
/// token. Returns `None` when the value is zero, overflows, or the token
/// length is outside `10..=15`.
pub fn normalize_timestamp(token: &[u8]) -> Option<i64> {
    let value = parse_leading_digits(token)?;
    if value == 0 {
        return None;
    }

    match token.len() {
        MIN_TIMESTAMP_DIGITS..MILLIS_TIMESTAMP_DIGITS => value.checked_mul(1000),
        MILLIS_TIMESTAMP_DIGITS..=MAX_TIMESTAMP_DIGITS => Some(value),
        _ => None,
    }
}

/// Parses leading decimal digits with overflow checking.
fn parse_leading_digits(token: &[u8]) -> Option<i64> {
    token
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .try_fold(0_i64, |acc, &b| {
            acc.checked_mul(10)?.checked_add(i64::from(b - b'0'))
        })
}

/// Renders epoch milliseconds as RFC 3339, or the raw number if out of range.
pub fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms).map_or_else(
        || format!("{ms}ms"),
        |dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digits_are_seconds() {
        assert_eq!(normalize_timestamp(b"1420070400"), Some(1_420_070_400_000));
    }

    #[test]
    fn test_twelve_digits_are_seconds() {
        assert_eq!(
            normalize_timestamp(b"142007040012"),
            Some(142_007_040_012_000)
        );
    }

    #[test]
    fn test_thirteen_digits_are_millis() {
        assert_eq!(
            normalize_timestamp(b"1420070400123"),
            Some(1_420_070_400_123)
        );
    }

    #[test]
    fn test_fourteen_and_fifteen_digits_pass_through() {
        assert_eq!(
            normalize_timestamp(b"14200704001234"),
            Some(14_200_704_001_234)
        );
        assert_eq!(
            normalize_timestamp(b"142007040012345"),
            Some(142_007_040_012_345)
        );
    }

    #[test]
    fn test_rejects_short_and_long_tokens() {
        assert_eq!(normalize_timestamp(b"142007040"), None);
        assert_eq!(normalize_timestamp(b"1420070400123456"), None);
        assert_eq!(normalize_timestamp(b""), None);
    }

    #[test]
    fn test_rejects_zero() {
        assert_eq!(normalize_timestamp(b"0000000000000"), None);
    }

    #[test]
    fn test_rejects_overflow() {
        let token = b"9".repeat(40);
        assert_eq!(normalize_timestamp(&token), None);
    }

    #[test]
    fn test_trailing_garbage_counts_toward_length() {
        // Ten digits plus three junk bytes reads as a thirteen byte token.
        assert_eq!(normalize_timestamp(b"1420070400abc"), Some(1_420_070_400));
        assert_eq!(normalize_timestamp(b"abc1420070400"), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(1_420_070_400_123),
            "2015-01-01T00:00:00.123Z"
        );
    }
}
