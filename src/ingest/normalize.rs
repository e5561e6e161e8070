use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

use super::timestamp;
use crate::models::{Turn, TurnKind, UNKNOWN_SPEAKER};

pub const TIMESTAMP_FIELDS: &[&str] = &[
    "ts",
    "timestamp",
    "time",
    "date",
    "created_at",
    "sent_at",
    "datetime",
];
pub const SPEAKER_FIELDS: &[&str] = &[
    "speaker",
    "speaker_name",
    "author",
    "from",
    "sender",
    "user",
    "name",
];
pub const TEXT_FIELDS: &[&str] = &["text", "content", "message", "body"];
pub const KIND_FIELDS: &[&str] = &["kind", "type", "category", "channel"];

static DISPLAY_NAME_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.*?)\s*<(?P<email>[^<>]*)>\s*$").expect("valid regex")
});

/// First candidate key present with a non-null value. Keys match case-insensitively.
pub fn find_field<'a>(obj: &'a Map<String, Value>, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().find_map(|cand| {
        obj.iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(cand) && !v.is_null())
            .map(|(_, v)| v)
    })
}

/// Normalize heterogeneous records into turns, in input order.
/// Non-object records and records without text are dropped.
pub fn normalize(records: &[Value]) -> Vec<Turn> {
    records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let turn = normalize_record(r);
            if turn.is_none() {
                debug!("Dropping record {i}: not an object or no text");
            }
            turn
        })
        .collect()
}

pub fn normalize_record(record: &Value) -> Option<Turn> {
    let obj = record.as_object()?;

    let text = find_field(obj, TEXT_FIELDS).and_then(scalar_text)?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let speaker = match find_field(obj, SPEAKER_FIELDS) {
        None => UNKNOWN_SPEAKER.to_string(),
        Some(v) => speaker_from_value(v),
    };

    let timestamp = find_field(obj, TIMESTAMP_FIELDS).and_then(timestamp::canonicalize_value);

    let kind = find_field(obj, KIND_FIELDS)
        .and_then(Value::as_str)
        .map(TurnKind::from_label)
        .unwrap_or_default();

    Some(Turn {
        timestamp,
        speaker,
        text,
        kind,
    })
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn speaker_from_value(v: &Value) -> String {
    match v {
        Value::Object(inner) => {
            let nested = ["name", "email"].iter().find_map(|k| {
                find_field(inner, &[*k])
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
            });
            match nested {
                Some(s) => clean_speaker(s),
                None => UNKNOWN_SPEAKER.to_string(),
            }
        }
        // Present but blank stays blank so validation can flag it.
        Value::String(s) => clean_speaker(s),
        Value::Number(n) => n.to_string(),
        _ => UNKNOWN_SPEAKER.to_string(),
    }
}

/// Strip `<email>` after a display name, a leading `@`, and surrounding quotes.
pub fn clean_speaker(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    if let Some(caps) = DISPLAY_NAME_EMAIL.captures(&s) {
        let name = caps["name"].trim();
        s = if name.is_empty() {
            caps["email"].trim().to_string()
        } else {
            name.to_string()
        };
    }
    let s = s.trim().trim_start_matches('@');
    s.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .to_string()
}
