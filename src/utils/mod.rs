//! Utility functions shared across the ingestion pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};

pub mod time;

/// Normalize a URL by ensuring it has a proper scheme (http:// or https://).
/// If the URL already has a scheme, it returns it unchanged.
/// If the URL lacks a scheme, it prepends "http://"
pub fn normalize_url_scheme(url: &str) -> String {
    let trimmed_url = url.trim_end_matches('/');

    if trimmed_url.starts_with("http://") || trimmed_url.starts_with("https://") {
        trimmed_url.to_string()
    } else {
        format!("http://{}", trimmed_url)
    }
}

/// Parse datetime from RFC3339 or SQLite format.
///
/// Stored rows keep timestamps as text; this accepts both the RFC3339
/// form written by the ingestors and SQLite's "YYYY-MM-DD HH:MM:SS".
pub fn parse_datetime(datetime_str: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
    }

    Err(sqlx::Error::Decode(
        format!("Unable to parse datetime: {}", datetime_str).into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_normalize_url_scheme() {
        assert_eq!(
            normalize_url_scheme("example.com/feed"),
            "http://example.com/feed"
        );
        assert_eq!(
            normalize_url_scheme("https://example.com/"),
            "https://example.com"
        );
    }

    #[test]
    fn test_parse_datetime_both_formats() {
        let rfc = parse_datetime("2024-03-01T10:30:00+00:00").unwrap();
        let sqlite = parse_datetime("2024-03-01 10:30:00").unwrap();
        assert_eq!(rfc, sqlite);
        assert_eq!(rfc.hour(), 10);
        assert!(parse_datetime("not-a-date").is_err());
    }
}
