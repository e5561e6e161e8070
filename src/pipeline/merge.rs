use std::collections::HashMap;

use super::stats::BasicStats;
use crate::models::{
    normalized_text, ActionItem, ChunkInsight, HealthFlags, MergedInsight, RankedItem, ToneCounts,
};

/// Positive share of tone counts above which the exchange reads as positive.
const POSITIVE_TONE_THRESHOLD: f64 = 0.6;
/// Model clarity rating (0-10) at or above which clarity is flagged high.
const HIGH_CLARITY_THRESHOLD: f64 = 7.5;
/// Model engagement rating (0-10) at or above which engagement is flagged good.
const GOOD_ENGAGEMENT_THRESHOLD: f64 = 7.0;
/// Most distinct topics a focused conversation covers.
const MAX_FOCUSED_TOPICS: usize = 10;

/// Reconcile per-chunk insights into one. Deterministic regardless of the
/// order insights arrive in.
pub fn merge(insights: &[ChunkInsight], stats: &BasicStats) -> MergedInsight {
    let mut ordered: Vec<&ChunkInsight> = insights.iter().collect();
    ordered.sort_by_key(|i| i.chunk_index);

    let mut tone = ToneCounts::default();
    for ins in &ordered {
        tone.add(&ins.tone);
    }

    let action_items = merge_action_items(&ordered);
    let risk_flags = concat_unique(&ordered, |i| &i.risk_flags);
    let collaboration_indicators = concat_unique(&ordered, |i| &i.collaboration_indicators);
    let conflict_indicators = concat_unique(&ordered, |i| &i.conflict_indicators);
    let key_topics = rank(&ordered, |i| &i.key_topics);
    let clarity = weighted_mean(&ordered, |i| i.clarity);
    let engagement = weighted_mean(&ordered, |i| i.engagement);

    let flags = HealthFlags {
        has_unresolved_risk: !risk_flags.is_empty(),
        conflicts_detected: !conflict_indicators.is_empty() || tone.toxic > 0,
        collaboration_present: !collaboration_indicators.is_empty(),
        positive_tone: tone.positive_ratio() > POSITIVE_TONE_THRESHOLD,
        high_clarity: clarity.is_some_and(|c| c >= HIGH_CLARITY_THRESHOLD),
        good_engagement: engagement.is_some_and(|e| e >= GOOD_ENGAGEMENT_THRESHOLD),
        topic_focus: key_topics.len() <= MAX_FOCUSED_TOPICS,
        unassigned_action_items: action_items.iter().filter(|a| a.owner.is_none()).count(),
        fallback_chunks: ordered.iter().filter(|i| i.fallback).count(),
    };

    MergedInsight {
        chunk_count: ordered.len(),
        total_words: stats.total_words,
        tone,
        tone_descriptors: rank(&ordered, |i| &i.tone_descriptors),
        key_topics,
        decisions: concat_unique(&ordered, |i| &i.decisions),
        action_items,
        risk_flags,
        collaboration_indicators,
        conflict_indicators,
        clarity,
        engagement,
        flags,
    }
}

fn concat_unique<F>(ordered: &[&ChunkInsight], field: F) -> Vec<String>
where
    F: Fn(&ChunkInsight) -> &Vec<String>,
{
    let mut seen = std::collections::HashSet::new();
    ordered
        .iter()
        .flat_map(|&i| field(i).iter())
        .filter(|s| seen.insert(normalized_text(s)))
        .cloned()
        .collect()
}

/// Keyed on task. A later duplicate fills an owner or due date the first lacked.
fn merge_action_items(ordered: &[&ChunkInsight]) -> Vec<ActionItem> {
    let mut out: Vec<ActionItem> = Vec::new();
    let mut by_task: HashMap<String, usize> = HashMap::new();
    for item in ordered.iter().flat_map(|i| i.action_items.iter()) {
        let key = normalized_text(&item.task);
        match by_task.get(&key) {
            Some(&idx) => {
                let existing = &mut out[idx];
                if existing.owner.is_none() {
                    existing.owner = item.owner.clone();
                }
                if existing.due_date.is_none() {
                    existing.due_date = item.due_date.clone();
                }
            }
            None => {
                by_task.insert(key, out.len());
                out.push(item.clone());
            }
        }
    }
    out
}

/// Frequency across chunks, ties broken by first appearance.
fn rank<F>(ordered: &[&ChunkInsight], field: F) -> Vec<RankedItem>
where
    F: Fn(&ChunkInsight) -> &Vec<String>,
{
    let mut ranked: Vec<RankedItem> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for s in ordered.iter().flat_map(|&i| field(i).iter()) {
        let key = normalized_text(s);
        match by_key.get(&key) {
            Some(&idx) => ranked[idx].frequency += 1,
            None => {
                by_key.insert(key, ranked.len());
                ranked.push(RankedItem {
                    item: s.clone(),
                    frequency: 1,
                });
            }
        }
    }
    // Stable sort keeps first-appearance order among equal frequencies.
    ranked.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    ranked
}

/// Word-count-weighted mean over chunks that report the value.
fn weighted_mean<F>(ordered: &[&ChunkInsight], value: F) -> Option<f64>
where
    F: Fn(&ChunkInsight) -> Option<f64>,
{
    let reported: Vec<(f64, f64)> = ordered
        .iter()
        .filter(|i| !i.fallback)
        .filter_map(|&i| value(i).map(|v| (v, i.word_count as f64)))
        .filter(|(v, _)| v.is_finite())
        .collect();

    match reported.as_slice() {
        [] => None,
        [(only, _)] => Some(*only),
        many => {
            let total_weight: f64 = many.iter().map(|(_, w)| w).sum();
            if total_weight > 0.0 {
                Some(many.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight)
            } else {
                Some(many.iter().map(|(v, _)| v).sum::<f64>() / many.len() as f64)
            }
        }
    }
}
