use anyhow::{bail, Context, Result};
use serde_json::Value;

use super::normalize::{find_field, TEXT_FIELDS};
use super::RawInput;

/// Keys under which an object may wrap its list of records.
pub const WRAPPER_KEYS: &[&str] = &["messages", "turns", "segments", "sentences", "records"];

/// Parse a JSON document into a payload.
pub fn parse_json(content: &str) -> Result<RawInput> {
    let value: Value = serde_json::from_str(content).context("Failed to parse JSON payload")?;
    from_value(value)
}

/// Parse a YAML document into a payload.
pub fn parse_yaml(content: &str) -> Result<RawInput> {
    let value: Value = serde_yaml::from_str(content).context("Failed to parse YAML payload")?;
    from_value(value)
}

/// Accept an array of records, a bare string, a wrapper object, or a single record.
pub fn from_value(value: Value) -> Result<RawInput> {
    match value {
        Value::Array(records) => Ok(RawInput::Records(records)),
        Value::String(text) => Ok(RawInput::Text(text)),
        Value::Object(mut map) => {
            let wrapper = WRAPPER_KEYS.iter().find_map(|key| {
                map.keys()
                    .find(|k| k.eq_ignore_ascii_case(key) && map[k.as_str()].is_array())
                    .cloned()
            });
            if let Some(key) = wrapper {
                if let Some(Value::Array(records)) = map.remove(&key) {
                    return Ok(RawInput::Records(records));
                }
            }
            if find_field(&map, TEXT_FIELDS).is_some() {
                return Ok(RawInput::Records(vec![Value::Object(map)]));
            }
            bail!(
                "Object has no records; expected one of: {}",
                WRAPPER_KEYS.join(", ")
            )
        }
        other => bail!("Unsupported payload: expected array, string or object, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapper_objects_unwrap() {
        for key in WRAPPER_KEYS {
            let doc = format!(r#"{{"title": "x", "{key}": [{{"text": "hi"}}]}}"#);
            match parse_json(&doc).unwrap() {
                RawInput::Records(r) => assert_eq!(r, vec![json!({"text": "hi"})]),
                other => panic!("{key}: {other:?}"),
            }
        }
    }

    #[test]
    fn bare_string_is_text() {
        assert_eq!(
            parse_json(r#""alice: hi""#).unwrap(),
            RawInput::Text("alice: hi".into())
        );
    }

    #[test]
    fn single_record_object() {
        let input = parse_json(r#"{"speaker": "a", "body": "hello"}"#).unwrap();
        assert!(matches!(input, RawInput::Records(ref r) if r.len() == 1));
    }

    #[test]
    fn yaml_sequence_of_records() {
        let input = parse_yaml("messages:\n  - from: alice\n    content: hi\n  - from: bob\n    content: yo\n").unwrap();
        match input {
            RawInput::Records(r) => {
                assert_eq!(r.len(), 2);
                assert_eq!(r[1]["from"], "bob");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn rejects_unusable_documents() {
        assert!(parse_json("42").is_err());
        assert!(parse_json(r#"{"title": "no records"}"#).is_err());
        assert!(parse_json("{not json").is_err());
    }
}
