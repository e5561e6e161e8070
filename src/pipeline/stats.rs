use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::ingest::timestamp;
use crate::models::Turn;

static QUESTION_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(what about|how about|what if|what do you think|any thoughts|thoughts on|please clarify|can you explain|could you tell me)\b",
    )
    .expect("valid regex")
});

static ACKNOWLEDGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(thanks|thank you|got it|sounds good|makes sense|agreed|will do|noted|understood|on it|good point)\b",
    )
    .expect("valid regex")
});

/// Per-speaker contribution totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeakerStats {
    pub speaker: String,
    pub turns: usize,
    pub words: usize,
    /// Fraction of all words, 0-1.
    pub share: f64,
}

/// Reply latency distribution (counts per bucket).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LatencyBuckets {
    pub within_5m: usize,
    pub within_30m: usize,
    pub within_2h: usize,
    pub within_8h: usize,
    pub over_8h: usize,
}

/// Aggregate reply latency over speaker changes, in minutes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub median_minutes: f64,
    pub mean_minutes: f64,
    pub p90_minutes: f64,
    pub buckets: LatencyBuckets,
}

/// Deterministic conversation statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicStats {
    pub turn_count: usize,
    pub speaker_count: usize,
    pub total_words: usize,
    pub avg_words_per_turn: f64,
    /// In order of first appearance.
    pub speakers: Vec<SpeakerStats>,
    pub question_count: usize,
    pub question_ratio: f64,
    pub acknowledgment_count: usize,
    pub acknowledgment_ratio: f64,
    pub kind_counts: BTreeMap<String, usize>,
    /// 0-100; 100 means words are spread evenly across speakers.
    pub participation_balance: f64,
    /// Only set when timestamps were available.
    pub latency: Option<LatencyStats>,
    /// First to last timestamp, when timestamps were available.
    pub duration_minutes: Option<f64>,
}

/// A `?` anywhere, or an interrogative phrase. A leading "can" or "will"
/// alone does not make a question.
pub fn is_question(text: &str) -> bool {
    text.contains('?') || QUESTION_PHRASE.is_match(text)
}

pub fn is_acknowledgment(text: &str) -> bool {
    ACKNOWLEDGMENT.is_match(text)
}

/// Statistics without timing; latency is never reported.
pub fn compute_text_stats(turns: &[Turn]) -> BasicStats {
    let turn_count = turns.len();
    let word_counts: Vec<usize> = turns.iter().map(Turn::word_count).collect();
    let total_words: usize = word_counts.iter().sum();

    let mut speakers: Vec<SpeakerStats> = Vec::new();
    for (turn, &words) in turns.iter().zip(&word_counts) {
        match speakers.iter_mut().find(|s| s.speaker == turn.speaker) {
            Some(s) => {
                s.turns += 1;
                s.words += words;
            }
            None => speakers.push(SpeakerStats {
                speaker: turn.speaker.clone(),
                turns: 1,
                words,
                share: 0.0,
            }),
        }
    }
    for s in &mut speakers {
        s.share = ratio(s.words, total_words);
    }

    let question_count = turns.iter().filter(|t| is_question(&t.text)).count();
    let acknowledgment_count = turns.iter().filter(|t| is_acknowledgment(&t.text)).count();

    let mut kind_counts = BTreeMap::new();
    for t in turns {
        *kind_counts.entry(t.kind.as_str().to_string()).or_insert(0) += 1;
    }

    let shares: Vec<f64> = speakers.iter().map(|s| s.words as f64).collect();

    BasicStats {
        turn_count,
        speaker_count: speakers.len(),
        total_words,
        avg_words_per_turn: ratio(total_words, turn_count),
        participation_balance: participation_balance(&shares),
        speakers,
        question_count,
        question_ratio: ratio(question_count, turn_count),
        acknowledgment_count,
        acknowledgment_ratio: ratio(acknowledgment_count, turn_count),
        kind_counts,
        latency: None,
        duration_minutes: None,
    }
}

/// Statistics including reply latency. Gaps above `max_latency_minutes` are ignored.
pub fn compute_full_stats(turns: &[Turn], max_latency_minutes: f64) -> BasicStats {
    let mut stats = compute_text_stats(turns);
    let times: Vec<Option<DateTime<Utc>>> = turns
        .iter()
        .map(|t| t.timestamp.as_deref().and_then(timestamp::parse_str))
        .collect();

    let mut samples = Vec::new();
    for i in 1..turns.len() {
        if turns[i].speaker == turns[i - 1].speaker {
            continue;
        }
        if let (Some(prev), Some(cur)) = (times[i - 1], times[i]) {
            let minutes = (cur - prev).num_seconds() as f64 / 60.0;
            if (0.0..=max_latency_minutes).contains(&minutes) {
                samples.push(minutes);
            }
        }
    }
    stats.latency = latency_stats(samples);

    let present: Vec<DateTime<Utc>> = times.into_iter().flatten().collect();
    if let (Some(first), Some(last)) = (present.iter().min(), present.iter().max()) {
        stats.duration_minutes = Some((*last - *first).num_seconds() as f64 / 60.0);
    }
    stats
}

fn latency_stats(mut samples: Vec<f64>) -> Option<LatencyStats> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let n = samples.len();
    let median = if n % 2 == 1 {
        samples[n / 2]
    } else {
        (samples[n / 2 - 1] + samples[n / 2]) / 2.0
    };
    let mean = samples.iter().sum::<f64>() / n as f64;
    // Nearest-rank percentile.
    let rank = ((0.9 * n as f64).ceil() as usize).clamp(1, n);
    let p90 = samples[rank - 1];

    let mut buckets = LatencyBuckets::default();
    for &m in &samples {
        match m {
            m if m <= 5.0 => buckets.within_5m += 1,
            m if m <= 30.0 => buckets.within_30m += 1,
            m if m <= 120.0 => buckets.within_2h += 1,
            m if m <= 480.0 => buckets.within_8h += 1,
            _ => buckets.over_8h += 1,
        }
    }

    Some(LatencyStats {
        samples: n,
        median_minutes: median,
        mean_minutes: mean,
        p90_minutes: p90,
        buckets,
    })
}

/// `100 * (1 - Gini / ((n-1)/n))` over per-speaker word counts.
/// Fewer than two speakers (or no words) counts as perfectly balanced.
pub fn participation_balance(values: &[f64]) -> f64 {
    let n = values.len();
    let total: f64 = values.iter().sum();
    if n < 2 || total <= 0.0 {
        return 100.0;
    }
    let mean = total / n as f64;
    let mut abs_diff = 0.0;
    for a in values {
        for b in values {
            abs_diff += (a - b).abs();
        }
    }
    let gini = abs_diff / (2.0 * (n * n) as f64 * mean);
    let max_gini = (n as f64 - 1.0) / n as f64;
    (100.0 * (1.0 - gini / max_gini)).clamp(0.0, 100.0)
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(speaker: &str, text: &str, ts: &str) -> Turn {
        Turn::new(speaker, text).with_timestamp(ts)
    }

    #[test]
    fn acknowledgments_are_not_questions() {
        for text in ["Will do", "Can't make it today", "Is fine by me", "Do it now", "May be late"] {
            assert!(!is_question(text), "{text:?} counted as a question");
        }
        for text in ["Is it fine?", "how about Tuesday", "Could you tell me the date", "Thoughts on this"] {
            assert!(is_question(text), "{text:?} not counted as a question");
        }
    }

    #[test]
    fn counts_words_speakers_and_questions() {
        let turns = vec![
            Turn::new("alice", "What is the plan?"),
            Turn::new("bob", "We ship Friday."),
            Turn::new("alice", "Any thoughts on the risk"),
            Turn::new("bob", "Sounds good to me"),
        ];
        let s = compute_text_stats(&turns);
        assert_eq!(s.turn_count, 4);
        assert_eq!(s.total_words, 4 + 3 + 5 + 4);
        assert_eq!(s.speaker_count, 2);
        assert_eq!(s.speakers[0].speaker, "alice");
        assert_eq!(s.speakers[0].turns, 2);
        assert_eq!(s.question_count, 2);
        assert!((s.question_ratio - 0.5).abs() < 1e-12);
        assert_eq!(s.acknowledgment_count, 1);
        assert_eq!(s.kind_counts.get("unknown"), Some(&4));
        assert!(s.latency.is_none());
    }

    #[test]
    fn balance_bounds() {
        assert_eq!(participation_balance(&[]), 100.0);
        assert_eq!(participation_balance(&[42.0]), 100.0);
        assert!((participation_balance(&[10.0, 10.0, 10.0]) - 100.0).abs() < 1e-9);
        // Everything from one of two speakers is maximally unbalanced.
        assert!(participation_balance(&[100.0, 0.0]).abs() < 1e-9);
        let skewed = participation_balance(&[90.0, 10.0]);
        assert!(skewed > 0.0 && skewed < 100.0);
    }

    #[test]
    fn median_latency_over_alternating_speakers() {
        let turns = vec![
            at("a", "one", "2024-01-01T10:00:00Z"),
            at("b", "two", "2024-01-01T10:04:00Z"),
            at("a", "three", "2024-01-01T10:14:00Z"),
            at("a", "four", "2024-01-01T10:20:00Z"),
            at("b", "five", "2024-01-01T11:20:00Z"),
        ];
        let s = compute_full_stats(&turns, 7.0 * 24.0 * 60.0);
        let lat = s.latency.unwrap();
        // Samples: 4, 10, 60 (the a->a gap is skipped).
        assert_eq!(lat.samples, 3);
        assert_eq!(lat.median_minutes, 10.0);
        assert!((lat.mean_minutes - 74.0 / 3.0).abs() < 1e-9);
        assert_eq!(lat.p90_minutes, 60.0);
        assert_eq!(lat.buckets.within_5m, 1);
        assert_eq!(lat.buckets.within_30m, 1);
        assert_eq!(lat.buckets.within_2h, 1);
        assert_eq!(s.duration_minutes, Some(80.0));
    }

    #[test]
    fn even_sample_count_takes_true_median() {
        let turns = vec![
            at("a", "x", "2024-01-01T10:00:00Z"),
            at("b", "x", "2024-01-01T10:02:00Z"),
            at("a", "x", "2024-01-01T10:06:00Z"),
        ];
        let lat = compute_full_stats(&turns, 1e9).latency.unwrap();
        assert_eq!(lat.median_minutes, 3.0);
    }

    #[test]
    fn negative_and_huge_gaps_are_discarded() {
        let turns = vec![
            at("a", "x", "2024-01-02T10:00:00Z"),
            at("b", "x", "2024-01-01T10:00:00Z"),
            at("a", "x", "2024-03-01T10:00:00Z"),
        ];
        let s = compute_full_stats(&turns, 7.0 * 24.0 * 60.0);
        assert!(s.latency.is_none());
        assert!(s.duration_minutes.is_some());
    }

    #[test]
    fn empty_conversation_is_well_defined() {
        let s = compute_full_stats(&[], 60.0);
        assert_eq!(s.turn_count, 0);
        assert_eq!(s.question_ratio, 0.0);
        assert_eq!(s.participation_balance, 100.0);
        assert!(s.latency.is_none());
        assert!(s.duration_minutes.is_none());
    }
}
