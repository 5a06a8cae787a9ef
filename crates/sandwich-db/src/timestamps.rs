//! Timestamp text helpers.
//!
//! All timestamps are stored as fixed-width RFC 3339 UTC text
//! (microsecond precision, `Z` suffix) so that SQL string comparison
//! orders rows chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current instant in the canonical storage format.
pub fn now() -> String {
    to_text(Utc::now())
}

pub fn to_text(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Falls back to SQLite's bare
/// `YYYY-MM-DD HH:MM:SS` form for rows written by `datetime('now')`
/// defaults in older databases.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn canonical_format_round_trips() {
        let t = Utc::now();
        let text = to_text(t);
        let back = parse(&text).unwrap();
        assert_eq!(to_text(back), text);
    }

    #[test]
    fn canonical_format_sorts_chronologically() {
        let earlier = Utc::now();
        let later = earlier + Duration::minutes(3);
        assert!(to_text(earlier) < to_text(later));
    }

    #[test]
    fn sqlite_datetime_fallback_parses() {
        assert!(parse("2025-07-20 23:48:21").is_some());
        assert!(parse("not a timestamp").is_none());
    }
}
