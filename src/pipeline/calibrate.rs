use serde::Serialize;
use std::collections::BTreeMap;

use super::evidence::{Evidence, MarkerCounts};
use super::stats::BasicStats;
use crate::models::{Dimension, MergedInsight};

/// Weight of each dimension in the overall score. Must sum to 1.
pub const WEIGHTS: [(Dimension, f64); 5] = [
    (Dimension::Tone, 0.25),
    (Dimension::Clarity, 0.25),
    (Dimension::Responsiveness, 0.20),
    (Dimension::Participation, 0.15),
    (Dimension::Engagement, 0.15),
];

/// Lower bounds for each label, highest first.
pub const LABEL_THRESHOLDS: [(HealthLabel, f64); 3] = [
    (HealthLabel::Excellent, 85.0),
    (HealthLabel::Healthy, 70.0),
    (HealthLabel::Fair, 50.0),
];

/// Dimensions scoring below this get a recommendation.
pub const RECOMMENDATION_THRESHOLD: f64 = 60.0;

const NEUTRAL_SCORE: f64 = 50.0;
const NO_LATENCY_SCORE: f64 = 60.0;
const NO_MODEL_CLARITY: f64 = 60.0;
const SINGLE_SPEAKER_CAP: f64 = 50.0;

pub fn validate_weights() -> Result<(), String> {
    let sum: f64 = WEIGHTS.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > 1e-9 {
        return Err(format!("dimension weights sum to {sum}, expected 1.0"));
    }
    let mut dims: Vec<Dimension> = WEIGHTS.iter().map(|(d, _)| *d).collect();
    dims.sort();
    dims.dedup();
    if dims.len() != Dimension::ALL.len() {
        return Err("dimension weights must cover each dimension exactly once".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLabel {
    Excellent,
    Healthy,
    Fair,
    Poor,
}

impl HealthLabel {
    pub fn from_score(score: f64) -> Self {
        LABEL_THRESHOLDS
            .iter()
            .find(|(_, min)| score >= *min)
            .map(|(label, _)| *label)
            .unwrap_or(HealthLabel::Poor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Excellent => "excellent",
            HealthLabel::Healthy => "healthy",
            HealthLabel::Fair => "fair",
            HealthLabel::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub category: String,
    pub issue: String,
    pub suggestion: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreStatistics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

/// Inputs to calibration that come from how the run went rather than from the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationContext {
    pub structuring_fallback: bool,
    pub dropped_turns: usize,
    pub latency_half_life_minutes: f64,
}

impl Default for CalibrationContext {
    fn default() -> Self {
        Self {
            structuring_fallback: false,
            dropped_turns: 0,
            latency_half_life_minutes: 120.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub dimension_scores: BTreeMap<Dimension, f64>,
    pub overall_score: f64,
    pub overall_label: HealthLabel,
    /// 0-1.
    pub confidence: f64,
    pub recommendations: Vec<Recommendation>,
    pub score_statistics: ScoreStatistics,
}

impl Calibration {
    pub fn score(&self, dim: Dimension) -> f64 {
        self.dimension_scores.get(&dim).copied().unwrap_or(NEUTRAL_SCORE)
    }
}

/// Score every dimension, combine into the overall score, and attach
/// confidence and recommendations. Pure and deterministic.
pub fn calibrate(
    stats: &BasicStats,
    merged: &MergedInsight,
    evidence: &Evidence,
    ctx: &CalibrationContext,
) -> Calibration {
    let mut dimension_scores = BTreeMap::new();
    for dim in Dimension::ALL {
        let base = match dim {
            Dimension::Participation => participation(stats),
            Dimension::Clarity => clarity(stats, merged),
            Dimension::Responsiveness => responsiveness(stats, ctx.latency_half_life_minutes),
            Dimension::Engagement => engagement(stats, merged),
            Dimension::Tone => tone(merged),
        };
        let adjusted = base + evidence_adjustment(evidence.counts_for(dim));
        dimension_scores.insert(dim, bound(adjusted));
    }

    let overall_score = bound(
        WEIGHTS
            .iter()
            .map(|(dim, w)| dimension_scores[dim] * w)
            .sum(),
    );

    let confidence = confidence(stats, merged, evidence, ctx);
    let recommendations = recommendations(&dimension_scores, merged, overall_score);
    let score_statistics = score_statistics(&dimension_scores);

    Calibration {
        dimension_scores,
        overall_score,
        overall_label: HealthLabel::from_score(overall_score),
        confidence,
        recommendations,
        score_statistics,
    }
}

/// Clamp to [0,100]; non-finite values read as neutral.
fn bound(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// +3 per supporting turn (at most +10), -5 per concerning turn (at most -15).
fn evidence_adjustment(counts: MarkerCounts) -> f64 {
    let up = (3 * counts.supporting).min(10) as f64;
    let down = (5 * counts.concerning).min(15) as f64;
    up - down
}

fn participation(stats: &BasicStats) -> f64 {
    if stats.speaker_count <= 1 {
        stats.participation_balance.min(SINGLE_SPEAKER_CAP)
    } else {
        stats.participation_balance
    }
}

fn clarity(stats: &BasicStats, merged: &MergedInsight) -> f64 {
    let model = merged.clarity.map(|c| c * 10.0).unwrap_or(NO_MODEL_CLARITY);
    let total = merged.action_items.len();
    let mut score = if total > 0 {
        let owned = total - merged.flags.unassigned_action_items.min(total);
        (100.0 * owned as f64 / total as f64 + model) / 2.0
    } else {
        model
    };
    // Mostly questions and few answers.
    if stats.question_ratio > 0.6 {
        score -= 10.0;
    }
    score
}

fn responsiveness(stats: &BasicStats, half_life: f64) -> f64 {
    match &stats.latency {
        Some(lat) if half_life > 0.0 => 100.0 * 0.5_f64.powf(lat.median_minutes / half_life),
        _ => NO_LATENCY_SCORE,
    }
}

fn engagement(stats: &BasicStats, merged: &MergedInsight) -> f64 {
    let questions = (stats.question_ratio / 0.3).min(1.0) * 100.0;
    let acks = (stats.acknowledgment_ratio / 0.2).min(1.0) * 100.0;
    let statistical = (questions + acks) / 2.0;
    match merged.engagement {
        Some(e) => (statistical + e * 10.0) / 2.0,
        None => statistical,
    }
}

fn tone(merged: &MergedInsight) -> f64 {
    let t = &merged.tone;
    let (pos, neg, neu, tox) = (
        t.positive as f64,
        t.negative as f64,
        t.neutral as f64,
        t.toxic as f64,
    );
    let total = pos + neg + neu + tox;
    if total == 0.0 {
        return NEUTRAL_SCORE;
    }
    50.0 + 50.0 * (pos - neg - 2.0 * tox) / total
}

fn confidence(
    stats: &BasicStats,
    merged: &MergedInsight,
    evidence: &Evidence,
    ctx: &CalibrationContext,
) -> f64 {
    let latency = if stats.latency.is_some() { 1.0 } else { 0.5 };
    let turns = if stats.turn_count >= 10 {
        1.0
    } else {
        0.4 + 0.06 * stats.turn_count as f64
    };
    let speakers = if stats.speaker_count > 1 { 1.0 } else { 0.5 };
    let coverage = if merged.chunk_count == 0 {
        0.3
    } else {
        let ok = merged.chunk_count - merged.flags.fallback_chunks.min(merged.chunk_count);
        ok as f64 / merged.chunk_count as f64
    };
    let evidence_factor = if evidence.is_empty() { 0.6 } else { 1.0 };

    let mut c = (latency + turns + speakers + coverage + evidence_factor) / 5.0;
    if ctx.structuring_fallback {
        c *= 0.9;
    }
    c *= 0.95_f64.powi(ctx.dropped_turns.min(i32::MAX as usize) as i32);
    c.clamp(0.0, 1.0)
}

fn dimension_advice(dim: Dimension) -> (&'static str, &'static str) {
    match dim {
        Dimension::Tone => (
            "Tone shows tension or negativity",
            "Acknowledge concerns directly and keep feedback about the work, not the person.",
        ),
        Dimension::Clarity => (
            "Requests and decisions lack clarity or ownership",
            "Close each thread with a short summary of decisions, owners and due dates.",
        ),
        Dimension::Responsiveness => (
            "Replies are slow",
            "Agree on expected response times per channel and flag urgent items explicitly.",
        ),
        Dimension::Participation => (
            "Contribution is unbalanced across participants",
            "Invite quieter participants in by name and rotate who leads the discussion.",
        ),
        Dimension::Engagement => (
            "Participants seem disengaged",
            "Ask open questions and acknowledge others' input before moving on.",
        ),
    }
}

fn recommendations(
    scores: &BTreeMap<Dimension, f64>,
    merged: &MergedInsight,
    overall: f64,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    for dim in Dimension::ALL {
        let score = scores.get(&dim).copied().unwrap_or(NEUTRAL_SCORE);
        if score < RECOMMENDATION_THRESHOLD {
            let (issue, suggestion) = dimension_advice(dim);
            out.push(Recommendation {
                category: dim.as_str().to_string(),
                issue: format!("{issue} (score {score:.0})"),
                suggestion: suggestion.to_string(),
                priority: if score < 40.0 { Priority::High } else { Priority::Medium },
            });
        }
    }

    let unassigned = merged.flags.unassigned_action_items;
    if unassigned > 0 {
        out.push(Recommendation {
            category: "action_items".to_string(),
            issue: format!("{unassigned} action item(s) have no owner"),
            suggestion: "Assign an owner and a due date to every action item before closing the conversation."
                .to_string(),
            priority: Priority::Medium,
        });
    }

    if merged.flags.has_unresolved_risk {
        out.push(Recommendation {
            category: "risks".to_string(),
            issue: format!("{} unresolved risk(s) raised", merged.risk_flags.len()),
            suggestion: "Review open risks and make one person responsible for tracking each.".to_string(),
            priority: Priority::High,
        });
    }

    if overall < RECOMMENDATION_THRESHOLD {
        out.push(Recommendation {
            category: "overall".to_string(),
            issue: format!("Overall communication health is low (score {overall:.0})"),
            suggestion: "Hold a short retrospective on how this group communicates and agree on one change to try."
                .to_string(),
            priority: Priority::High,
        });
    }

    out
}

fn score_statistics(scores: &BTreeMap<Dimension, f64>) -> ScoreStatistics {
    let values: Vec<f64> = scores.values().copied().collect();
    if values.is_empty() {
        return ScoreStatistics { mean: 0.0, min: 0.0, max: 0.0, std: 0.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    ScoreStatistics {
        mean,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std: var.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionItem, Turn};
    use crate::pipeline::stats::{compute_full_stats, compute_text_stats};

    fn no_evidence() -> Evidence {
        let mut ev = Evidence::default();
        for d in Dimension::ALL {
            ev.items.insert(d, Vec::new());
            ev.counts.insert(d, MarkerCounts::default());
        }
        ev
    }

    #[test]
    fn weights_sum_to_one() {
        assert_eq!(validate_weights(), Ok(()));
        let sum: f64 = WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn label_thresholds() {
        assert_eq!(HealthLabel::from_score(85.0), HealthLabel::Excellent);
        assert_eq!(HealthLabel::from_score(84.9), HealthLabel::Healthy);
        assert_eq!(HealthLabel::from_score(70.0), HealthLabel::Healthy);
        assert_eq!(HealthLabel::from_score(50.0), HealthLabel::Fair);
        assert_eq!(HealthLabel::from_score(49.99), HealthLabel::Poor);
    }

    #[test]
    fn empty_conversation_stays_in_bounds() {
        let c = calibrate(
            &compute_text_stats(&[]),
            &MergedInsight::default(),
            &no_evidence(),
            &CalibrationContext::default(),
        );
        assert_eq!(c.dimension_scores.len(), 5);
        for (_, s) in &c.dimension_scores {
            assert!((0.0..=100.0).contains(s));
        }
        assert!((0.0..=100.0).contains(&c.overall_score));
        assert!((0.0..=1.0).contains(&c.confidence));
        assert_eq!(c.score(Dimension::Participation), 50.0);
        assert_eq!(c.score(Dimension::Tone), 50.0);
        assert_eq!(c.score(Dimension::Responsiveness), 60.0);
    }

    #[test]
    fn tone_formula_and_clamp() {
        let mut merged = MergedInsight::default();
        merged.tone.positive = 3;
        merged.tone.negative = 1;
        assert_eq!(tone(&merged), 75.0);
        merged.tone.toxic = 10;
        let c = calibrate(&compute_text_stats(&[]), &merged, &no_evidence(), &CalibrationContext::default());
        assert_eq!(c.score(Dimension::Tone), 0.0);
    }

    #[test]
    fn huge_tone_counts_stay_in_bounds() {
        let mut merged = MergedInsight::default();
        merged.tone.positive = u32::MAX;
        merged.tone.neutral = u32::MAX;
        assert!((tone(&merged) - 75.0).abs() < 1e-9);
        merged.tone.toxic = u32::MAX;
        let c = calibrate(&compute_text_stats(&[]), &merged, &no_evidence(), &CalibrationContext::default());
        assert!((0.0..=100.0).contains(&c.score(Dimension::Tone)));
        assert!((0.0..=100.0).contains(&c.overall_score));
    }

    #[test]
    fn responsiveness_halves_every_half_life() {
        let turns = vec![
            Turn::new("a", "x").with_timestamp("2024-01-01T10:00:00Z"),
            Turn::new("b", "y").with_timestamp("2024-01-01T12:00:00Z"),
        ];
        let stats = compute_full_stats(&turns, 1e6);
        assert!((responsiveness(&stats, 120.0) - 50.0).abs() < 1e-9);
        assert!((responsiveness(&stats, 240.0) - 100.0 * 0.5_f64.sqrt()).abs() < 1e-9);
        assert_eq!(responsiveness(&compute_text_stats(&turns), 120.0), 60.0);
    }

    #[test]
    fn clarity_mixes_ownership_and_model_rating() {
        let stats = compute_text_stats(&[Turn::new("a", "statement"), Turn::new("b", "reply")]);
        let mut merged = MergedInsight::default();
        assert_eq!(clarity(&stats, &merged), 60.0);
        merged.clarity = Some(8.0);
        merged.action_items = vec![
            ActionItem { task: "a".into(), owner: Some("x".into()), due_date: None },
            ActionItem { task: "b".into(), owner: None, due_date: None },
        ];
        merged.flags.unassigned_action_items = 1;
        assert_eq!(clarity(&stats, &merged), (50.0 + 80.0) / 2.0);
    }

    #[test]
    fn evidence_adjustment_is_capped() {
        assert_eq!(evidence_adjustment(MarkerCounts { supporting: 2, concerning: 0 }), 6.0);
        assert_eq!(evidence_adjustment(MarkerCounts { supporting: 9, concerning: 0 }), 10.0);
        assert_eq!(evidence_adjustment(MarkerCounts { supporting: 0, concerning: 9 }), -15.0);
    }

    #[test]
    fn confidence_penalties_compound() {
        let stats = compute_text_stats(&[]);
        let merged = MergedInsight::default();
        let ev = no_evidence();
        let base = calibrate(&stats, &merged, &ev, &CalibrationContext::default()).confidence;
        // latency .5, turns .4, speakers .5, coverage .3, evidence .6
        assert!((base - 0.46).abs() < 1e-9);
        let ctx = CalibrationContext {
            structuring_fallback: true,
            dropped_turns: 2,
            ..CalibrationContext::default()
        };
        let penalized = calibrate(&stats, &merged, &ev, &ctx).confidence;
        assert!((penalized - 0.46 * 0.9 * 0.95 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn recommendations_follow_rule_table_order() {
        let stats = compute_text_stats(&[Turn::new("solo", "I decided everything.")]);
        let mut merged = MergedInsight::default();
        merged.tone.negative = 5;
        merged.risk_flags = vec!["budget".into()];
        merged.flags.has_unresolved_risk = true;
        merged.action_items = vec![ActionItem { task: "t".into(), owner: None, due_date: None }];
        merged.flags.unassigned_action_items = 1;
        let c = calibrate(&stats, &merged, &no_evidence(), &CalibrationContext::default());
        let cats: Vec<_> = c.recommendations.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(cats.first(), Some(&"tone"));
        assert!(cats.contains(&"participation"));
        let ai = cats.iter().position(|c| *c == "action_items").unwrap();
        let risks = cats.iter().position(|c| *c == "risks").unwrap();
        assert!(ai < risks);
        assert_eq!(cats.last(), Some(&"overall"));
    }

    #[test]
    fn score_statistics_describe_the_five_scores() {
        let mut scores = BTreeMap::new();
        for (d, s) in Dimension::ALL.iter().zip([10.0, 20.0, 30.0, 40.0, 50.0]) {
            scores.insert(*d, s);
        }
        let st = score_statistics(&scores);
        assert_eq!((st.mean, st.min, st.max), (30.0, 10.0, 50.0));
        assert!((st.std - 200.0_f64.sqrt()).abs() < 1e-9);
    }
}
