//! Timestamp utilities
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision and a
//! `Z` suffix, so string order in SQLite equals chronological order.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

use crate::{StoreError, StoreResult};

/// Get current UTC timestamp, truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

/// Format a timestamp for storage
pub fn to_db(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("Invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_now_survives_storage_unchanged() {
        let timestamp = now();
        assert_eq!(from_db(&to_db(&timestamp)).unwrap(), timestamp);
    }

    #[test]
    fn test_stored_form_sorts_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2025, 9, 1, 2, 0, 0).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);
        let much_later = Utc.with_ymd_and_hms(2025, 12, 10, 8, 45, 0).unwrap();

        assert_eq!(to_db(&earlier), "2025-09-01T02:00:00.000000Z");
        assert!(to_db(&earlier) < to_db(&later));
        assert!(to_db(&later) < to_db(&much_later));
    }

    #[test]
    fn test_from_db_rejects_garbage() {
        let err = from_db("yesterday").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
