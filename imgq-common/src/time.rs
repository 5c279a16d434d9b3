//! Timestamp utilities
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision, so lexicographic order in SQL equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_storage(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Parse an optional stored timestamp
pub fn parse_storage_opt(value: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_storage(&v, column)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_storage_format_has_fixed_width() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let formatted = to_storage(&early);
        assert_eq!(formatted, "2024-01-02T03:04:05.000000Z");
    }

    #[test]
    fn test_storage_order_matches_chronological_order() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let c = a + chrono::Duration::hours(20);
        assert!(to_storage(&a) < to_storage(&b));
        assert!(to_storage(&b) < to_storage(&c));
    }

    #[test]
    fn test_parse_storage_round_trip() {
        let ts = now();
        let parsed = parse_storage(&to_storage(&ts), "annotated_at").unwrap();
        assert_eq!(parsed.timestamp_micros(), ts.timestamp_micros());
    }

    #[test]
    fn test_parse_storage_rejects_garbage() {
        let err = parse_storage("yesterday", "assigned_at").unwrap_err();
        assert!(err.to_string().contains("assigned_at"));
    }

    #[test]
    fn test_parse_storage_opt_none() {
        assert!(parse_storage_opt(None, "completed_at").unwrap().is_none());
    }
}
