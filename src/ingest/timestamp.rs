use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Date/time shapes that mark raw text as timestamped.
static TEXT_TIMESTAMP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(:\d{2})?",
        r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}(:\d{2})?",
        r"\b\d{1,2}/\d{1,2}/\d{2,4}\s+\d{1,2}:\d{2}",
        r"\b\d{2}:\d{2}:\d{2}\b",
        r"(?i)\b\d{1,2}:\d{2}\s*(AM|PM)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Parse a timestamp string in any supported format. Naive values are taken as UTC.
pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

/// Epoch seconds, or milliseconds when the value is above 1e11.
pub fn from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    if n > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(n as i64)
    } else {
        let secs = n.trunc() as i64;
        let nanos = ((n - n.trunc()) * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

/// Parse a JSON value (string or number) as a timestamp.
pub fn parse_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

/// Canonical RFC 3339 form carried on every turn.
pub fn canonical(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn canonicalize_value(value: &Value) -> Option<String> {
    parse_value(value).map(|dt| canonical(&dt))
}

/// Whether free text contains anything that looks like a date or clock time.
pub fn text_has_timestamps(text: &str) -> bool {
    TEXT_TIMESTAMP_PATTERNS.iter().any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_common_string_formats() {
        for s in [
            "2024-03-01T09:15:00Z",
            "2024-03-01T09:15:00+00:00",
            "2024-03-01T09:15:00",
            "2024-03-01 09:15:00",
            "2024-03-01 09:15",
            "03/01/2024 09:15",
            "03/01/2024 9:15 AM",
        ] {
            let dt = parse_str(s).unwrap_or_else(|| panic!("failed on {s}"));
            assert_eq!(canonical(&dt), "2024-03-01T09:15:00Z", "input {s}");
        }
    }

    #[test]
    fn date_only_is_midnight() {
        assert_eq!(canonical(&parse_str("2024-03-01").unwrap()), "2024-03-01T00:00:00Z");
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        let dt = parse_str("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(canonical(&dt), "2024-03-01T08:00:00Z");
    }

    #[test]
    fn epoch_seconds_and_millis() {
        assert_eq!(canonicalize_value(&json!(1_700_000_000)).unwrap(), "2023-11-14T22:13:20Z");
        assert_eq!(canonicalize_value(&json!(1_700_000_000_000i64)).unwrap(), "2023-11-14T22:13:20Z");
        assert_eq!(canonicalize_value(&json!("1700000000")).unwrap(), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_str("yesterday-ish").is_none());
        assert!(parse_str("   ").is_none());
        assert!(parse_value(&json!(true)).is_none());
        assert!(parse_value(&json!(null)).is_none());
        assert!(from_epoch(-5.0).is_none());
    }

    #[test]
    fn detects_timestamps_in_text() {
        assert!(text_has_timestamps("[2024-01-02 10:00] alice: hi"));
        assert!(text_has_timestamps("Bob at 3:45 PM said"));
        assert!(text_has_timestamps("at 10:11:12 we met"));
        assert!(!text_has_timestamps("alice: hi\nbob: hello"));
    }
}
