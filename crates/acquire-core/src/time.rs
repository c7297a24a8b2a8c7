//! UTC time helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a timestamp the way envelopes carry it.
pub fn to_synctime(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The `synctime` stamp for an envelope created now.
pub fn synctime() -> String {
    to_synctime(now())
}

/// Parse an envelope `synctime` stamp.
pub fn parse_synctime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synctime_roundtrip() {
        let t = now();
        let parsed = parse_synctime(&to_synctime(t)).unwrap();
        assert_eq!(parsed.timestamp_micros(), t.timestamp_micros());
    }

    #[test]
    fn test_synctime_is_utc() {
        assert!(synctime().ends_with('Z'));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_synctime("yesterday").is_none());
    }
}
