use serde_json::Value;

use super::normalize::{find_field, TIMESTAMP_FIELDS};
use super::{timestamp, RawInput};

/// Shape of an incoming payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub is_raw_text: bool,
    pub has_timestamps: bool,
    /// Why the shape could not be decided, when it couldn't. Defaults were applied.
    pub ambiguous: Option<String>,
}

impl Classification {
    fn ambiguous(reason: &str) -> Self {
        Self {
            is_raw_text: false,
            has_timestamps: false,
            ambiguous: Some(reason.to_string()),
        }
    }
}

/// Decide raw vs structured and whether timestamps are usable. Never fails.
pub fn classify(input: &RawInput) -> Classification {
    match input {
        RawInput::Text(text) => {
            if text.trim().is_empty() {
                return Classification::ambiguous("input text is blank");
            }
            Classification {
                is_raw_text: true,
                has_timestamps: timestamp::text_has_timestamps(text),
                ambiguous: None,
            }
        }
        RawInput::Records(records) => classify_records(records),
    }
}

fn classify_records(records: &[Value]) -> Classification {
    let present: Vec<&Value> = records.iter().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return Classification::ambiguous("record list is empty");
    }

    let objects = present.iter().filter(|v| v.is_object()).count();
    if objects == present.len() {
        return Classification {
            is_raw_text: false,
            has_timestamps: present.iter().all(|v| record_has_timestamp(v)),
            ambiguous: None,
        };
    }
    if objects == 0 {
        let joined = RawInput::Records(records.to_vec()).as_text();
        return Classification {
            is_raw_text: true,
            has_timestamps: timestamp::text_has_timestamps(&joined),
            ambiguous: None,
        };
    }
    Classification::ambiguous("records mix objects and scalar values")
}

/// Whether a record carries a parseable value under its first timestamp field.
pub fn record_has_timestamp(record: &Value) -> bool {
    record
        .as_object()
        .and_then(|obj| find_field(obj, TIMESTAMP_FIELDS))
        .and_then(timestamp::parse_value)
        .is_some()
}

/// Timestamp detection for an input whose path was forced by the caller.
pub fn detect_timestamps(input: &RawInput) -> bool {
    match input {
        RawInput::Text(text) => timestamp::text_has_timestamps(text),
        RawInput::Records(records) => {
            let present: Vec<&Value> = records.iter().filter(|v| v.is_object()).collect();
            !present.is_empty() && present.iter().all(|v| record_has_timestamp(v))
        }
    }
}
