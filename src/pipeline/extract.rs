use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::{prompts, schema, LanguageModel};
use crate::models::{normalized_text, ActionItem, Chunk, ChunkInsight, ToneCounts};

/// Owner values that mean nobody took the task.
const NO_OWNER: &[&str] = &["", "null", "none", "n/a", "unassigned", "tbd", "unknown", "nobody"];

/// Insights for every chunk, indexed by chunk, plus what went wrong.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub insights: Vec<ChunkInsight>,
    pub failures: Vec<PipelineError>,
    pub llm_calls: usize,
}

/// Extract every chunk, at most `max_parallel` model calls in flight at once.
/// A failed or panicking worker yields a fallback insight for its chunk only.
pub fn extract_all(
    chunks: &[Chunk],
    model: &dyn LanguageModel,
    max_parallel: usize,
) -> ExtractionOutcome {
    let mut results: Vec<Option<ChunkInsight>> = vec![None; chunks.len()];
    let mut failures = Vec::new();
    let indices: Vec<usize> = (0..chunks.len()).collect();

    for wave in indices.chunks(max_parallel.max(1)) {
        std::thread::scope(|scope| {
            let handles: Vec<_> = wave
                .iter()
                .map(|&i| (i, scope.spawn(move || extract_chunk(&chunks[i], i, model))))
                .collect();

            for (i, handle) in handles {
                let reason = match handle.join() {
                    Ok(Ok(insight)) => {
                        results[i] = Some(insight);
                        continue;
                    }
                    Ok(Err(reason)) => reason,
                    Err(_) => "extraction worker panicked".to_string(),
                };
                warn!("Chunk {i} extraction failed: {reason}");
                failures.push(PipelineError::ExtractionFailed {
                    chunk_index: i,
                    reason,
                });
            }
        });
    }

    let insights = results
        .into_iter()
        .zip(chunks)
        .enumerate()
        .map(|(i, (r, c))| r.unwrap_or_else(|| ChunkInsight::fallback(i, c.word_count())))
        .collect();

    ExtractionOutcome {
        insights,
        failures,
        llm_calls: chunks.len(),
    }
}

/// One model call for one chunk.
pub fn extract_chunk(
    chunk: &Chunk,
    chunk_index: usize,
    model: &dyn LanguageModel,
) -> Result<ChunkInsight, String> {
    let prompt = prompts::extraction(&chunk.turns, &chunk.turn_index_map);
    let completion = model
        .complete(&prompt, &schema::chunk_insight())
        .map_err(|e| format!("model call failed: {e:#}"))?;
    match completion.json {
        Some(json @ Value::Object(_)) => {
            debug!("Chunk {chunk_index}: {} bytes of model output", completion.raw.len());
            Ok(parse_insight(&json, chunk_index, chunk.word_count()))
        }
        Some(_) => Err("model returned JSON that is not an object".to_string()),
        None => Err("model returned no JSON".to_string()),
    }
}

/// Lenient read of a model reply: every field defaults, numbers are clamped,
/// lists are trimmed and deduplicated. A tone count never exceeds the chunk's
/// word count.
pub fn parse_insight(json: &Value, chunk_index: usize, word_count: usize) -> ChunkInsight {
    let tone_obj = json.get("tone").or_else(|| json.get("tone_counts"));
    let ceiling = word_count.min(u32::MAX as usize) as f64;
    let count = |key: &str| -> u32 {
        tone_obj
            .and_then(|t| t.get(key))
            .and_then(number)
            .map(|n| n.clamp(0.0, ceiling) as u32)
            .unwrap_or(0)
    };

    ChunkInsight {
        chunk_index,
        word_count,
        tone: ToneCounts {
            positive: count("positive"),
            negative: count("negative"),
            neutral: count("neutral"),
            toxic: count("toxic"),
        },
        tone_descriptors: string_list(json.get("tone_descriptors")),
        decisions: string_list(json.get("decisions")),
        action_items: action_items(json.get("action_items")),
        risk_flags: string_list(json.get("risk_flags")),
        collaboration_indicators: string_list(json.get("collaboration_indicators")),
        conflict_indicators: string_list(json.get("conflict_indicators")),
        key_topics: string_list(json.get("key_topics")),
        clarity: score(json.get("clarity_score").or_else(|| json.get("clarity"))),
        engagement: score(json.get("engagement_level").or_else(|| json.get("engagement"))),
        fallback: false,
    }
}

fn number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn score(v: Option<&Value>) -> Option<f64> {
    v.and_then(number).map(|n| n.clamp(0.0, 10.0))
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(normalized_text(s)))
        .collect()
}

fn optional_text(v: Option<&Value>) -> Option<String> {
    let s = v?.as_str()?.trim();
    if NO_OWNER.contains(&s.to_lowercase().as_str()) {
        None
    } else {
        Some(s.to_string())
    }
}

fn action_items(v: Option<&Value>) -> Vec<ActionItem> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(ActionItem {
                task: s.trim().to_string(),
                owner: None,
                due_date: None,
            }),
            Value::Object(obj) => {
                let task = ["task", "description", "text", "title"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))?
                    .trim()
                    .to_string();
                Some(ActionItem {
                    task,
                    owner: optional_text(obj.get("owner").or_else(|| obj.get("assignee"))),
                    due_date: optional_text(obj.get("due_date").or_else(|| obj.get("due"))),
                })
            }
            _ => None,
        })
        .filter(|a| !a.task.is_empty() && seen.insert(normalized_text(&a.task)))
        .collect()
}
