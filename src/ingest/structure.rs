use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::json::WRAPPER_KEYS;
use super::normalize::{clean_speaker, normalize};
use super::timestamp;
use crate::llm::{prompts, schema, LanguageModel};
use crate::models::{Turn, TurnKind, UNKNOWN_SPEAKER};

/// `[ts] Speaker: text`, `2024-01-01 10:00 Speaker: text` or `Speaker: text`.
static SPEAKER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:\[(?P<bts>[^\]]+)\]\s*|(?P<lts>\d{4}-\d{2}-\d{2}[T ]\d{1,2}:\d{2}(?::\d{2})?(?:Z|[+-]\d{2}:?\d{2})?|\d{1,2}/\d{1,2}/\d{2,4},?\s+\d{1,2}:\d{2}(?:\s*[AaPp][Mm])?|\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AaPp][Mm])?)\s+(?:-\s+)?)?(?P<speaker>[A-Za-z][\w .'@<>\-]{0,59}?)\s*:\s+(?P<text>\S.*)$",
    )
    .expect("valid regex")
});

static EMAIL_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(from|subject):\s").expect("valid regex")
});

/// Header labels that never name a speaker.
const HEADER_LABELS: &[&str] = &["subject", "to", "cc", "bcc", "date", "sent", "re", "fwd"];

/// Result of turning raw text into turns.
#[derive(Debug, Clone)]
pub struct StructureOutcome {
    pub turns: Vec<Turn>,
    /// Set when the heuristic splitter was used instead of the model.
    pub fallback_reason: Option<String>,
    pub llm_calls: usize,
}

/// Ask the model to structure `text`; fall back to the line splitter on any failure.
pub fn structure(text: &str, model: &dyn LanguageModel) -> StructureOutcome {
    let reason = match model.complete(&prompts::structuring(text), &schema::messages()) {
        Err(e) => format!("model call failed: {e:#}"),
        Ok(c) => match c.json {
            None => "model returned no JSON".to_string(),
            Some(json) => {
                let turns = normalize(&messages_from(json));
                if !turns.is_empty() {
                    debug!("Model structured {} turns", turns.len());
                    return StructureOutcome {
                        turns,
                        fallback_reason: None,
                        llm_calls: 1,
                    };
                }
                "model returned no usable messages".to_string()
            }
        },
    };

    warn!("Structuring fell back to heuristic splitter: {reason}");
    StructureOutcome {
        turns: heuristic_split(text),
        fallback_reason: Some(reason),
        llm_calls: 1,
    }
}

fn messages_from(json: Value) -> Vec<Value> {
    match json {
        Value::Array(items) => items,
        Value::Object(mut map) => WRAPPER_KEYS
            .iter()
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Split text on `Speaker: text` lines. Unmarked lines continue the current
/// turn; lines before the first marker form one "unknown" turn.
pub fn heuristic_split(text: &str) -> Vec<Turn> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let kind = infer_kind(trimmed);
    let mut turns: Vec<Turn> = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();
    let mut saw_marker = false;

    for line in trimmed.lines() {
        let line_trim = line.trim();
        if line_trim.is_empty() {
            continue;
        }

        if let Some(caps) = SPEAKER_LINE.captures(line) {
            let label = caps["speaker"].trim();
            let lower = label.to_lowercase();
            if HEADER_LABELS.contains(&lower.as_str()) {
                continue;
            }
            let ts = caps
                .name("bts")
                .or_else(|| caps.name("lts"))
                .and_then(|m| timestamp::parse_str(m.as_str()))
                .map(|dt| timestamp::canonical(&dt));

            saw_marker = true;
            if lower == "from" {
                // Email header: the value names the author of the body below.
                turns.push(Turn {
                    timestamp: ts,
                    speaker: clean_speaker(&caps["text"]),
                    text: String::new(),
                    kind,
                });
                continue;
            }
            turns.push(Turn {
                timestamp: ts,
                speaker: clean_speaker(label),
                text: caps["text"].trim().to_string(),
                kind,
            });
            continue;
        }

        match turns.last_mut() {
            Some(current) => {
                if !current.text.is_empty() {
                    current.text.push('\n');
                }
                current.text.push_str(line_trim);
            }
            None => preamble.push(line_trim),
        }
    }

    if !saw_marker {
        return vec![Turn::new(UNKNOWN_SPEAKER, trimmed).with_kind(kind)];
    }

    let mut out = Vec::with_capacity(turns.len() + 1);
    if !preamble.is_empty() {
        out.push(Turn::new(UNKNOWN_SPEAKER, preamble.join("\n")).with_kind(kind));
    }
    out.extend(turns.into_iter().filter(|t| !t.text.trim().is_empty()));
    if out.is_empty() {
        // Only headers with no body: keep the text rather than lose it.
        return vec![Turn::new(UNKNOWN_SPEAKER, trimmed).with_kind(kind)];
    }
    out
}

fn infer_kind(text: &str) -> TurnKind {
    if EMAIL_HEADER.is_match(text) {
        TurnKind::Email
    } else if text.lines().any(|l| l.trim_start().starts_with('[')) {
        TurnKind::Chat
    } else {
        TurnKind::Unknown
    }
}
