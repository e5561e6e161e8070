use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::ingest::normalize::normalize_record;
use crate::ingest::timestamp;
use crate::llm::prompts::{self, RemediationItem};
use crate::llm::{schema, LanguageModel};
use crate::models::Turn;

/// Speakers longer than this are truncated.
pub const MAX_SPEAKER_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    EmptyText,
    MissingSpeaker,
    UnparseableTimestamp,
    SpeakerTooLong,
}

impl ValidationErrorKind {
    /// Hard errors make a turn unusable until repaired.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            ValidationErrorKind::EmptyText | ValidationErrorKind::MissingSpeaker
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ValidationErrorKind::EmptyText => "message text is empty",
            ValidationErrorKind::MissingSpeaker => "speaker is empty",
            ValidationErrorKind::UnparseableTimestamp => "timestamp could not be parsed",
            ValidationErrorKind::SpeakerTooLong => "speaker name is too long",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub turn_index: usize,
    pub kind: ValidationErrorKind,
}

/// Check every turn. Soft problems are fixed in the returned turns (timestamp
/// nulled, speaker truncated); turns with hard problems are returned as-is
/// and flagged.
pub fn validate(turns: &[Turn]) -> (Vec<Turn>, Vec<ValidationError>) {
    let mut errors = Vec::new();
    let mut out = Vec::with_capacity(turns.len());

    for (i, turn) in turns.iter().enumerate() {
        let mut turn = turn.clone();
        let mut flag = |kind| errors.push(ValidationError { turn_index: i, kind });

        if turn.text.trim().is_empty() {
            flag(ValidationErrorKind::EmptyText);
        }
        if turn.speaker.trim().is_empty() {
            flag(ValidationErrorKind::MissingSpeaker);
        }
        if let Some(ts) = turn.timestamp.take() {
            match timestamp::parse_str(&ts) {
                Some(dt) => turn.timestamp = Some(timestamp::canonical(&dt)),
                None => flag(ValidationErrorKind::UnparseableTimestamp),
            }
        }
        if turn.speaker.chars().count() > MAX_SPEAKER_CHARS {
            turn.speaker = turn.speaker.chars().take(MAX_SPEAKER_CHARS).collect();
            flag(ValidationErrorKind::SpeakerTooLong);
        }

        out.push(turn);
    }

    (out, errors)
}

pub fn has_hard_errors(errors: &[ValidationError]) -> bool {
    errors.iter().any(|e| e.kind.is_hard())
}

/// What one remediation pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemediationOutcome {
    #[serde(skip)]
    pub turns: Vec<Turn>,
    pub attempted: usize,
    pub replaced: usize,
    pub dropped: usize,
    pub llm_calls: usize,
    /// Why the model's corrections could not be used, if they couldn't.
    pub failure: Option<String>,
}

/// One corrective model pass over turns with hard errors. Corrected records
/// replace originals by index; anything still invalid afterwards is dropped.
pub fn remediate(
    turns: &[Turn],
    errors: &[ValidationError],
    model: &dyn LanguageModel,
) -> RemediationOutcome {
    let mut problems: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for e in errors.iter().filter(|e| e.kind.is_hard() && e.turn_index < turns.len()) {
        problems
            .entry(e.turn_index)
            .or_default()
            .push(e.kind.describe().to_string());
    }

    let items: Vec<RemediationItem<'_>> = problems
        .iter()
        .map(|(&index, problems)| RemediationItem {
            index,
            turn: &turns[index],
            problems: problems.clone(),
        })
        .collect();

    let mut repaired = turns.to_vec();
    let mut replaced = 0;
    let mut failure = None;
    let llm_calls = if items.is_empty() { 0 } else { 1 };

    if !items.is_empty() {
        match model.complete(&prompts::remediation(&items), &schema::remediation()) {
            Err(e) => failure = Some(format!("model call failed: {e:#}")),
            Ok(c) => match c.json {
                None => failure = Some("model returned no JSON".to_string()),
                Some(json) => {
                    for (index, fixed) in corrections(&json) {
                        if !problems.contains_key(&index) {
                            debug!("Ignoring correction for turn {index}: it had no hard errors");
                            continue;
                        }
                        if let Some(mut turn) = normalize_record(&fixed) {
                            if turn.timestamp.is_none() {
                                turn.timestamp = repaired[index].timestamp.clone();
                            }
                            repaired[index] = turn;
                            replaced += 1;
                        }
                    }
                }
            },
        }
    }

    let (revalidated, remaining) = validate(&repaired);
    let still_bad: std::collections::HashSet<usize> = remaining
        .iter()
        .filter(|e| e.kind.is_hard())
        .map(|e| e.turn_index)
        .collect();
    let kept: Vec<Turn> = revalidated
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !still_bad.contains(i))
        .map(|(_, t)| t)
        .collect();

    if !still_bad.is_empty() {
        warn!("Dropping {} turn(s) that failed validation after remediation", still_bad.len());
    }

    RemediationOutcome {
        turns: kept,
        attempted: items.len(),
        replaced,
        dropped: still_bad.len(),
        llm_calls,
        failure,
    }
}

fn corrections(json: &Value) -> Vec<(usize, Value)> {
    let list = match json {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("turns") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    list.iter()
        .filter_map(|item| {
            let index = item.get("index")?.as_u64()? as usize;
            Some((index, item.clone()))
        })
        .collect()
}
