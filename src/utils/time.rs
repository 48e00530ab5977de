//! XMLTV timestamp handling.
//!
//! XMLTV encodes programme times as `YYYYMMDDHHMMSS` optionally followed
//! by a UTC offset (`+0200`, `-0530`). Offset-less values are interpreted
//! in a configured fallback timezone.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Validate a timezone name against the IANA database.
pub fn validate_timezone(timezone: &str) -> Result<Tz, String> {
    timezone
        .parse::<Tz>()
        .map_err(|_| format!("Unknown timezone: {}", timezone))
}

/// Parse a timezone name, falling back to UTC on anything unknown.
pub fn parse_timezone_or_utc(timezone: &str) -> Tz {
    match validate_timezone(timezone) {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Unknown timezone: {}, using UTC", timezone);
            chrono_tz::UTC
        }
    }
}

/// Parse an XMLTV datetime string into UTC.
///
/// Accepts `YYYYMMDDHHMMSS` with an optional ` ±HHMM` suffix. Returns
/// `None` on anything shorter than fourteen digits or out-of-range
/// calendar values; the caller treats that as a failed element.
pub fn parse_xmltv_datetime(datetime_str: &str, fallback_tz: &Tz) -> Option<DateTime<Utc>> {
    let mut parts = datetime_str.split_whitespace();
    let digits = parts.next()?;
    let offset = parts.next();

    if digits.len() < 14 || !digits.as_bytes()[..14].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let year: i32 = digits[0..4].parse().ok()?;
    let month: u32 = digits[4..6].parse().ok()?;
    let day: u32 = digits[6..8].parse().ok()?;
    let hour: u32 = digits[8..10].parse().ok()?;
    let minute: u32 = digits[10..12].parse().ok()?;
    let second: u32 = digits[12..14].parse().ok()?;

    let naive_dt = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;

    match offset {
        Some(offset_str) => {
            let offset = parse_utc_offset(offset_str)?;
            let local_dt = offset.from_local_datetime(&naive_dt).single()?;
            Some(local_dt.with_timezone(&Utc))
        }
        None => {
            let local_dt = fallback_tz.from_local_datetime(&naive_dt).single()?;
            Some(local_dt.with_timezone(&Utc))
        }
    }
}

/// Parse a `±HHMM` UTC offset suffix.
fn parse_utc_offset(offset_str: &str) -> Option<FixedOffset> {
    let (sign, rest) = if let Some(rest) = offset_str.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = offset_str.strip_prefix('-') {
        (-1, rest)
    } else {
        return None;
    };

    if rest.len() != 4 || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = rest[0..2].parse().ok()?;
    let minutes: i32 = rest[2..4].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_with_utc_offset() {
        let tz = chrono_tz::UTC;
        let dt = parse_xmltv_datetime("20240315120000 +0200", &tz).unwrap();
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.day(), 15);

        let dt = parse_xmltv_datetime("20240315120000 -0530", &tz).unwrap();
        assert_eq!(dt.hour(), 17);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_without_offset_uses_fallback_timezone() {
        let berlin: Tz = "Europe/Berlin".parse().unwrap();
        // 2024-01-15 is CET (+0100).
        let dt = parse_xmltv_datetime("20240115120000", &berlin).unwrap();
        assert_eq!(dt.hour(), 11);
    }

    #[test]
    fn test_parse_rejects_short_or_garbled_input() {
        let tz = chrono_tz::UTC;
        assert!(parse_xmltv_datetime("20240315", &tz).is_none());
        assert!(parse_xmltv_datetime("2024031512000x", &tz).is_none());
        assert!(parse_xmltv_datetime("20241315120000", &tz).is_none());
    }

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("Europe/London").is_ok());
        assert!(validate_timezone("Mars/Olympus").is_err());
        assert_eq!(parse_timezone_or_utc("Mars/Olympus"), chrono_tz::UTC);
    }

    #[test]
    fn test_parse_preserves_date_components() {
        let tz = chrono_tz::UTC;
        let dt = parse_xmltv_datetime("20231215120000 +0000", &tz).unwrap();
        assert_eq!(dt.year(), 2023);
        assert_eq!(dt.month(), 12);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 12);
    }
}
